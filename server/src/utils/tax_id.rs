//! Brazilian tax identifiers: CPF (individuals) and CNPJ (companies).

const CNPJ_FIRST_WEIGHTS: [u32; 12] = [5, 4, 3, 2, 9, 8, 7, 6, 5, 4, 3, 2];
const CNPJ_SECOND_WEIGHTS: [u32; 13] = [6, 5, 4, 3, 2, 9, 8, 7, 6, 5, 4, 3, 2];

/// Strips punctuation (`529.982.247-25` -> `52998224725`).
pub fn normalize(value: &str) -> String {
    value.chars().filter(char::is_ascii_digit).collect()
}

fn digits_of(value: &str, expected_len: usize) -> Option<Vec<u32>> {
    if value
        .chars()
        .any(|c| !(c.is_ascii_digit() || matches!(c, '.' | '-' | '/' | ' ')))
    {
        return None;
    }
    let digits: Vec<u32> = value.chars().filter_map(|c| c.to_digit(10)).collect();
    if digits.len() != expected_len || digits.iter().all(|d| *d == digits[0]) {
        return None;
    }
    Some(digits)
}

pub fn is_valid_cpf(value: &str) -> bool {
    let Some(digits) = digits_of(value, 11) else {
        return false;
    };

    let check = |len: usize| -> u32 {
        let sum: u32 = digits[..len]
            .iter()
            .zip((2..=len as u32 + 1).rev())
            .map(|(d, w)| d * w)
            .sum();
        (sum * 10) % 11 % 10
    };

    check(9) == digits[9] && check(10) == digits[10]
}

pub fn is_valid_cnpj(value: &str) -> bool {
    let Some(digits) = digits_of(value, 14) else {
        return false;
    };

    let check = |weights: &[u32]| -> u32 {
        let sum: u32 = digits.iter().zip(weights).map(|(d, w)| d * w).sum();
        match sum % 11 {
            r if r < 2 => 0,
            r => 11 - r,
        }
    };

    check(&CNPJ_FIRST_WEIGHTS) == digits[12] && check(&CNPJ_SECOND_WEIGHTS) == digits[13]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpf() {
        assert!(is_valid_cpf("529.982.247-25"));
        assert!(is_valid_cpf("11144477735"));
        assert!(!is_valid_cpf("529.982.247-26"));
        assert!(!is_valid_cpf("111.111.111-11"));
        assert!(!is_valid_cpf("5299822472"));
        assert!(!is_valid_cpf("529a982b247c25"));
    }

    #[test]
    fn test_cnpj() {
        assert!(is_valid_cnpj("11.222.333/0001-81"));
        assert!(is_valid_cnpj("11444777000161"));
        assert!(!is_valid_cnpj("11.222.333/0001-82"));
        assert!(!is_valid_cnpj("00000000000000"));
        assert!(!is_valid_cnpj("52998224725"));
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("11.222.333/0001-81"), "11222333000181");
    }
}
