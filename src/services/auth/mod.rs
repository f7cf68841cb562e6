pub mod claims;
pub mod factory;
pub mod issuer;
pub mod keys;
pub mod refresh;
pub mod validator;

pub use claims::{Claims, Permissions, TokenType, Userinfo};
pub use factory::{build_refresher, build_validator};
pub use issuer::{HttpTokenIssuer, IssuedToken, TokenIssuer};
pub use keys::{HttpKeySource, KeyCache, KeySource};
pub use refresh::TokenRefresher;
pub use validator::{TokenValidator, TokenVerifier, ValidatorOptions};
