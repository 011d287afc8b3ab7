use serde::{Deserialize, Serialize};

/// Authenticated account making the request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: String,
}

/// JWT Claims
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // account id
    pub exp: usize,  // expiration time
    pub iat: usize,  // issued at
}
