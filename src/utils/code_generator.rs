use rand::Rng;

const VOUCHER_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
pub const VOUCHER_CODE_LEN: usize = 6;

/// Uniformly random 6-character voucher code over `A-Z0-9`.
///
/// Uniqueness is probabilistic (36^6 codes); redemption looks codes up
/// together with the business, so collisions across establishments are harmless.
pub fn generate_voucher_code() -> String {
    let mut rng = rand::thread_rng();
    (0..VOUCHER_CODE_LEN)
        .map(|_| VOUCHER_ALPHABET[rng.gen_range(0..VOUCHER_ALPHABET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_voucher_code_shape() {
        for _ in 0..200 {
            let code = generate_voucher_code();
            assert_eq!(code.len(), VOUCHER_CODE_LEN);
            assert!(
                code.chars()
                    .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
            );
        }
    }

    #[test]
    fn test_generate_voucher_code_varies() {
        let codes: std::collections::HashSet<String> =
            (0..50).map(|_| generate_voucher_code()).collect();
        // 50 draws from 36^6 colliding down to one value would mean a broken rng
        assert!(codes.len() > 1);
    }
}
