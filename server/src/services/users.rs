use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use super::access;
use super::credentials::hash_password;
use crate::auth::{PasswordHasher, SessionTokens};
use crate::models::pagination::Page;
use crate::models::user::{
    stamp_of, Actor, CreateUserRequest, ListUsersQuery, ProfileType, UpdateUserRequest, User,
    UserChanges, UserFilter, UserSort, UserView,
};
use crate::store::{StoreError, UserStore};
use crate::utils::error::{AppError, ErrorCode};
use crate::utils::tax_id;
use crate::utils::validation::{ValidationCode, Validator, PASSWORD_MIN_LENGTH};

#[derive(Clone)]
pub struct UserService {
    users: Arc<dyn UserStore>,
    hasher: Arc<dyn PasswordHasher>,
    tokens: Arc<SessionTokens>,
}

/// CPF for participants, CNPJ for promoters, either for admins.
fn check_tax_id(v: &mut Validator, value: Option<&str>, profile: ProfileType) -> Option<String> {
    let raw = v.required("taxId", value)?;
    let digits = tax_id::normalize(&raw);
    let (valid, code) = match profile {
        ProfileType::Participant => (tax_id::is_valid_cpf(&digits), ValidationCode::InvalidCpf),
        ProfileType::Promoter => (tax_id::is_valid_cnpj(&digits), ValidationCode::InvalidCnpj),
        ProfileType::Admin => (
            tax_id::is_valid_cpf(&digits) || tax_id::is_valid_cnpj(&digits),
            ValidationCode::InvalidCpfOrCnpj,
        ),
    };
    if valid {
        Some(digits)
    } else {
        v.push("taxId", code);
        None
    }
}

fn check_password(
    v: &mut Validator,
    field: &str,
    value: Option<&str>,
    too_short: ValidationCode,
) -> Option<String> {
    match value {
        None | Some("") => {
            v.push(field, ValidationCode::RequiredField);
            None
        }
        Some(p) if p.chars().count() < PASSWORD_MIN_LENGTH => {
            v.push(field, too_short);
            None
        }
        Some(p) => Some(p.to_string()),
    }
}

fn already_exists(e: StoreError) -> AppError {
    match e {
        StoreError::Conflict { .. } => AppError::business(ErrorCode::UserAlreadyExists),
        other => other.into(),
    }
}

impl UserService {
    pub fn new(
        users: Arc<dyn UserStore>,
        hasher: Arc<dyn PasswordHasher>,
        tokens: Arc<SessionTokens>,
    ) -> Self {
        Self {
            users,
            hasher,
            tokens,
        }
    }

    /// Public registration; promoters and participants only.
    pub async fn signup(&self, request: CreateUserRequest) -> Result<UserView, AppError> {
        self.register(request, &[ProfileType::Promoter, ProfileType::Participant], None)
            .await
    }

    pub async fn admin_create(
        &self,
        request: CreateUserRequest,
        actor: &Actor,
    ) -> Result<UserView, AppError> {
        access::require_profile(actor, &[ProfileType::Admin])?;
        self.register(
            request,
            &[ProfileType::Admin, ProfileType::Promoter, ProfileType::Participant],
            Some(actor),
        )
        .await
    }

    async fn register(
        &self,
        request: CreateUserRequest,
        allowed: &[ProfileType],
        actor: Option<&Actor>,
    ) -> Result<UserView, AppError> {
        let mut v = Validator::new();
        let name = v.required("name", request.name.as_deref());
        let email = v.email("email", request.email.as_deref());
        let password = check_password(
            &mut v,
            "password",
            request.password.as_deref(),
            ValidationCode::PasswordMinLength,
        );
        let confirmation = check_password(
            &mut v,
            "passwordConfirmation",
            request.password_confirmation.as_deref(),
            ValidationCode::PasswordConfirmationMinLength,
        );
        if let (Some(p), Some(c)) = (&password, &confirmation) {
            if p != c {
                v.push("passwordConfirmation", ValidationCode::PasswordsDontMatch);
            }
        }
        let profile = match request.profile_type.as_deref().map(ProfileType::parse) {
            Some(Some(p)) if allowed.contains(&p) => Some(p),
            _ => {
                v.push("profileType", ValidationCode::InvalidProfileType);
                None
            }
        };
        let tax_id = match profile {
            Some(p) => check_tax_id(&mut v, request.tax_id.as_deref(), p),
            None => None,
        };
        v.finish()?;

        let (Some(name), Some(email), Some(password), Some(profile_type), Some(tax_id)) =
            (name, email, password, profile, tax_id)
        else {
            return Err(AppError::InternalServerError(
                "validated user draft is incomplete".to_string(),
            ));
        };

        self.ensure_unique(Some(email.as_str()), Some(tax_id.as_str()), None).await?;

        let digest = hash_password(&self.hasher, password).await?;
        let now = Utc::now();
        let stamp = stamp_of(actor);
        let user = User {
            id: Uuid::new_v4(),
            name,
            tax_id,
            address: request
                .address
                .map(|a| a.trim().to_string())
                .filter(|a| !a.is_empty()),
            email,
            password: digest,
            profile_type,
            created_by: stamp.clone(),
            created_at: now,
            updated_by: stamp,
            updated_at: now,
            deleted_by: None,
            deleted_at: None,
        };

        let user = self.users.insert(user).await.map_err(already_exists)?;
        info!(user_id = %user.id, profile_type = ?user.profile_type, "User registered");
        Ok(UserView::from(user))
    }

    /// Email and tax id belong to at most one live user.
    async fn ensure_unique(
        &self,
        email: Option<&str>,
        tax_id: Option<&str>,
        exclude_id: Option<Uuid>,
    ) -> Result<(), AppError> {
        let lookups = [
            email.map(|e| UserFilter {
                email: Some(e.to_string()),
                exclude_id,
                ..UserFilter::default()
            }),
            tax_id.map(|t| UserFilter {
                tax_id: Some(t.to_string()),
                exclude_id,
                ..UserFilter::default()
            }),
        ];
        for filter in lookups.iter().flatten() {
            if self.users.select_one_by_filter(filter).await?.is_some() {
                return Err(AppError::business(ErrorCode::UserAlreadyExists));
            }
        }
        Ok(())
    }

    pub async fn get(&self, id: Uuid) -> Result<UserView, AppError> {
        self.users
            .select_by_id(id)
            .await?
            .map(UserView::from)
            .ok_or_else(|| AppError::business(ErrorCode::EntityNotFound))
    }

    pub async fn me(&self, actor: &Actor) -> Result<UserView, AppError> {
        self.get(actor.id).await
    }

    pub async fn list(
        &self,
        query: ListUsersQuery,
        actor: &Actor,
    ) -> Result<Page<UserView>, AppError> {
        access::require_profile(actor, &[ProfileType::Admin])?;
        let page = query.page.resolve::<UserSort>()?;

        let mut v = Validator::new();
        let mut profile_types = Vec::new();
        for raw in query
            .profile_type
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
        {
            match ProfileType::parse(raw) {
                Some(p) => profile_types.push(p),
                None => v.push("profileType", ValidationCode::InvalidProfileType),
            }
        }
        v.finish()?;

        let filter = UserFilter {
            name_contains: query.name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()),
            email_contains: query.email.map(|e| e.trim().to_string()).filter(|e| !e.is_empty()),
            profile_types,
            ..UserFilter::default()
        };
        let page = self.users.select_page(&filter, &page).await?;
        Ok(page.map(UserView::from))
    }

    async fn load_for_change(&self, id: Uuid, actor: &Actor) -> Result<User, AppError> {
        let user = self
            .users
            .select_by_id(id)
            .await?
            .ok_or_else(|| AppError::business(ErrorCode::UserNotFound))?;
        access::ensure_self_or_admin(actor, user.id)?;
        Ok(user)
    }

    pub async fn update(
        &self,
        id: Uuid,
        request: UpdateUserRequest,
        actor: &Actor,
    ) -> Result<UserView, AppError> {
        let user = self.load_for_change(id, actor).await?;

        let mut v = Validator::new();
        let name = v.optional_non_blank("name", request.name.as_deref());
        let email = match request.email.as_deref() {
            Some(raw) => v.email("email", Some(raw)),
            None => None,
        };
        let tax_id = match request.tax_id.as_deref() {
            Some(raw) => check_tax_id(&mut v, Some(raw), user.profile_type),
            None => None,
        };
        v.finish()?;

        let changes = UserChanges {
            name,
            tax_id,
            address: request.address.map(|a| a.trim().to_string()),
            email,
            updated_by: actor.stamp(),
        };
        if changes.name.is_none()
            && changes.tax_id.is_none()
            && changes.address.is_none()
            && changes.email.is_none()
        {
            return Ok(UserView::from(user));
        }

        self.ensure_unique(changes.email.as_deref(), changes.tax_id.as_deref(), Some(user.id))
            .await?;

        let updated = self
            .users
            .update_fields(user.id, &changes)
            .await
            .map_err(already_exists)?
            .ok_or_else(|| AppError::business(ErrorCode::UserNotFound))?;
        info!(user_id = %updated.id, updated_by = %changes.updated_by, "User updated");
        Ok(UserView::from(updated))
    }

    /// Soft delete; the user's sessions end with it.
    pub async fn delete(&self, id: Uuid, actor: &Actor) -> Result<(), AppError> {
        let user = self.load_for_change(id, actor).await?;
        if !self.users.soft_delete(user.id, &actor.stamp()).await? {
            return Err(AppError::business(ErrorCode::UserNotFound));
        }
        self.tokens.revoke_user(user.id).await;
        info!(user_id = %user.id, deleted_by = %actor.id, "User deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::user::LoginRequest;
    use crate::testing;

    fn signup_request(profile: &str, tax_id: &str, email: &str) -> CreateUserRequest {
        CreateUserRequest {
            name: Some("Ana Souza".to_string()),
            tax_id: Some(tax_id.to_string()),
            address: Some("Rua das Flores, 10".to_string()),
            email: Some(email.to_string()),
            password: Some("password1".to_string()),
            password_confirmation: Some("password1".to_string()),
            profile_type: Some(profile.to_string()),
        }
    }

    fn codes(err: AppError) -> Vec<(String, ValidationCode)> {
        match err {
            AppError::Validation(fields) => fields.into_iter().map(|f| (f.field, f.code)).collect(),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_signup_participant_and_promoter() {
        let services = testing::services();
        let participant = services
            .users
            .signup(signup_request("PARTICIPANT", "529.982.247-25", "Ana@Example.com"))
            .await
            .unwrap();
        assert_eq!(participant.tax_id, "52998224725");
        assert_eq!(participant.email, "ana@example.com");
        assert_eq!(participant.profile_type, ProfileType::Participant);

        let promoter = services
            .users
            .signup(signup_request("PROMOTER", "11.222.333/0001-81", "shows@example.com"))
            .await
            .unwrap();
        assert_eq!(promoter.profile_type, ProfileType::Promoter);

        let json = serde_json::to_value(&promoter).unwrap();
        assert!(json.get("password").is_none());
    }

    #[tokio::test]
    async fn test_signup_validation() {
        let services = testing::services();

        let err = services
            .users
            .signup(signup_request("ADMIN", "52998224725", "root@example.com"))
            .await
            .unwrap_err();
        assert_eq!(
            codes(err),
            vec![("profileType".to_string(), ValidationCode::InvalidProfileType)]
        );

        let err = services
            .users
            .signup(signup_request("PROMOTER", "52998224725", "p@example.com"))
            .await
            .unwrap_err();
        assert_eq!(codes(err), vec![("taxId".to_string(), ValidationCode::InvalidCnpj)]);

        let mut request = signup_request("PARTICIPANT", "12345678900", "bad-email");
        request.password = Some("short".to_string());
        request.password_confirmation = Some("different1".to_string());
        let found = codes(services.users.signup(request).await.unwrap_err());
        assert!(found.contains(&("email".to_string(), ValidationCode::InvalidEmail)));
        assert!(found.contains(&("password".to_string(), ValidationCode::PasswordMinLength)));
        assert!(found.contains(&("taxId".to_string(), ValidationCode::InvalidCpf)));

        let mut request = signup_request("PARTICIPANT", "52998224725", "x@example.com");
        request.password_confirmation = Some("password2".to_string());
        assert_eq!(
            codes(services.users.signup(request).await.unwrap_err()),
            vec![(
                "passwordConfirmation".to_string(),
                ValidationCode::PasswordsDontMatch
            )]
        );
    }

    #[tokio::test]
    async fn test_duplicate_email_or_tax_id() {
        let services = testing::services();
        services
            .users
            .signup(signup_request("PARTICIPANT", "52998224725", "ana@example.com"))
            .await
            .unwrap();

        let same_email = services
            .users
            .signup(signup_request("PARTICIPANT", "11144477735", "ANA@example.com"))
            .await
            .unwrap_err();
        assert_eq!(same_email.business_code(), Some(ErrorCode::UserAlreadyExists));

        let same_tax_id = services
            .users
            .signup(signup_request("PARTICIPANT", "52998224725", "other@example.com"))
            .await
            .unwrap_err();
        assert_eq!(same_tax_id.business_code(), Some(ErrorCode::UserAlreadyExists));
    }

    #[tokio::test]
    async fn test_admin_create_requires_admin() {
        let services = testing::services();
        let request = signup_request("ADMIN", "11222333000181", "ops@example.com");

        let err = services
            .users
            .admin_create(request.clone(), &testing::actor(ProfileType::Promoter))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let admin = testing::actor(ProfileType::Admin);
        let created = services.users.admin_create(request, &admin).await.unwrap();
        assert_eq!(created.profile_type, ProfileType::Admin);
    }

    #[tokio::test]
    async fn test_update_self_or_admin() {
        let services = testing::services();
        let user = testing::registered_user(&services, ProfileType::Participant, "password1").await;
        let me = Actor::from(&user);

        let patch = UpdateUserRequest {
            name: Some("Ana Lima".to_string()),
            ..UpdateUserRequest::default()
        };
        let updated = services.users.update(user.id, patch.clone(), &me).await.unwrap();
        assert_eq!(updated.name, "Ana Lima");
        assert_eq!(updated.email, user.email);

        let err = services
            .users
            .update(user.id, patch.clone(), &testing::actor(ProfileType::Participant))
            .await
            .unwrap_err();
        assert_eq!(err.business_code(), Some(ErrorCode::UserBlocked));

        services
            .users
            .update(user.id, patch.clone(), &testing::actor(ProfileType::Admin))
            .await
            .unwrap();

        let err = services
            .users
            .update(Uuid::new_v4(), patch, &me)
            .await
            .unwrap_err();
        assert_eq!(err.business_code(), Some(ErrorCode::UserNotFound));
    }

    #[tokio::test]
    async fn test_update_uniqueness_excludes_self() {
        let services = testing::services();
        let ana = testing::registered_user(&services, ProfileType::Participant, "password1").await;
        let bia = testing::registered_user(&services, ProfileType::Participant, "password1").await;
        let me = Actor::from(&ana);

        let keep = UpdateUserRequest {
            email: Some(ana.email.clone()),
            tax_id: Some(ana.tax_id.clone()),
            ..UpdateUserRequest::default()
        };
        services.users.update(ana.id, keep, &me).await.unwrap();

        let steal = UpdateUserRequest {
            email: Some(bia.email.clone()),
            ..UpdateUserRequest::default()
        };
        let err = services.users.update(ana.id, steal, &me).await.unwrap_err();
        assert_eq!(err.business_code(), Some(ErrorCode::UserAlreadyExists));
    }

    #[tokio::test]
    async fn test_delete_is_soft_and_ends_sessions() {
        let services = testing::services();
        let user = testing::registered_user(&services, ProfileType::Participant, "password1").await;
        let pair = services
            .credentials
            .authenticate(LoginRequest {
                email: Some(user.email.clone()),
                password: Some("password1".to_string()),
            })
            .await
            .unwrap();

        let err = services
            .users
            .delete(user.id, &testing::actor(ProfileType::Promoter))
            .await
            .unwrap_err();
        assert_eq!(err.business_code(), Some(ErrorCode::UserBlocked));

        services.users.delete(user.id, &Actor::from(&user)).await.unwrap();

        assert_eq!(
            services.users.get(user.id).await.unwrap_err().business_code(),
            Some(ErrorCode::EntityNotFound)
        );
        assert!(services.credentials.resolve(&pair.access_token).await.is_err());

        // The email is free again once the holder is gone.
        let request = CreateUserRequest {
            name: Some("Returning".to_string()),
            tax_id: Some(user.tax_id.clone()),
            address: None,
            email: Some(user.email.clone()),
            password: Some("password1".to_string()),
            password_confirmation: Some("password1".to_string()),
            profile_type: Some("PARTICIPANT".to_string()),
        };
        services.users.signup(request).await.unwrap();
    }

    #[tokio::test]
    async fn test_list_is_admin_only_and_filters_profiles() {
        let services = testing::services();
        testing::registered_user(&services, ProfileType::Participant, "password1").await;
        testing::registered_user(&services, ProfileType::Promoter, "password1").await;

        let err = services
            .users
            .list(ListUsersQuery::default(), &testing::actor(ProfileType::Promoter))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let query = ListUsersQuery {
            profile_type: Some("promoter".to_string()),
            ..ListUsersQuery::default()
        };
        let page = services
            .users
            .list(query, &testing::actor(ProfileType::Admin))
            .await
            .unwrap();
        assert_eq!(page.count, 1);
        assert_eq!(page.rows[0].profile_type, ProfileType::Promoter);
    }
}
