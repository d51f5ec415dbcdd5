//! Primitivas de segurança para contas de usuário
//!
//! Hash de senhas com Argon2id, tokens aleatórios seguros para URL e códigos
//! OTP numéricos.

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::{distributions::Alphanumeric, rngs::OsRng, Rng};
use thiserror::Error;

/// Erros específicos para operações de criptografia
#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Falha ao gerar hash da senha: {0}")]
    HashFailed(String),

    #[error("Hash de senha inválido: {0}")]
    InvalidHash(String),
}

/// Tamanho dos tokens de redefinição de senha
const RESET_TOKEN_LEN: usize = 43;

/// Quantidade de dígitos de um código OTP
pub const OTP_DIGITS: usize = 6;

/// Gera o hash Argon2id (formato PHC) de uma senha
pub fn hash_password(password: &str) -> Result<String, CryptoError> {
    let salt = SaltString::generate(&mut OsRng);

    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| CryptoError::HashFailed(e.to_string()))?;

    Ok(hash.to_string())
}

/// Confere uma senha contra um hash PHC armazenado
pub fn verify_password(password: &str, stored_hash: &str) -> Result<bool, CryptoError> {
    let parsed =
        PasswordHash::new(stored_hash).map_err(|e| CryptoError::InvalidHash(e.to_string()))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// Token aleatório alfanumérico, seguro para uso em URLs
pub fn generate_url_token() -> String {
    OsRng
        .sample_iter(&Alphanumeric)
        .take(RESET_TOKEN_LEN)
        .map(char::from)
        .collect()
}

/// Código numérico de 6 dígitos (com zeros à esquerda)
pub fn generate_otp_code() -> String {
    let value: u32 = OsRng.gen_range(0..1_000_000);
    format!("{:0width$}", value, width = OTP_DIGITS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_hash_roundtrip() -> Result<(), CryptoError> {
        let hash = hash_password("segredo123")?;

        assert_ne!(hash, "segredo123");
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("segredo123", &hash)?);
        assert!(!verify_password("senha-errada", &hash)?);

        Ok(())
    }

    #[test]
    fn test_same_password_different_salts() -> Result<(), CryptoError> {
        let a = hash_password("mesma-senha")?;
        let b = hash_password("mesma-senha")?;
        assert_ne!(a, b);
        Ok(())
    }

    #[test]
    fn test_invalid_hash() {
        assert!(verify_password("qualquer", "nao-e-um-hash").is_err());
    }

    #[test]
    fn test_url_token() {
        let token = generate_url_token();
        assert_eq!(token.len(), RESET_TOKEN_LEN);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(token, generate_url_token());
    }

    #[test]
    fn test_otp_code_format() {
        for _ in 0..100 {
            let code = generate_otp_code();
            assert_eq!(code.len(), OTP_DIGITS);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }
}
