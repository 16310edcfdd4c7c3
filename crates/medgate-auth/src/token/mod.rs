//! Bearer credential issuance and verification.

pub mod jwt;

pub use jwt::{
    ACCESS_TOKEN_TYPE, AccessTokenClaims, CredentialError, CredentialIssuer, CredentialVerifier,
    IssuedCredential, VerifiedCredential,
};
