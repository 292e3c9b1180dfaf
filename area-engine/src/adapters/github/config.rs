pub const BASE_URL: &str = "https://api.github.com";
pub const AUTH_URL: &str = "https://github.com/login/oauth/authorize";
pub const TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
pub const SCOPES: &[&str] = &["repo", "read:user", "user:email"];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants() {
        assert_eq!(BASE_URL, "https://api.github.com");
        assert_eq!(AUTH_URL, "https://github.com/login/oauth/authorize");
        assert_eq!(TOKEN_URL, "https://github.com/login/oauth/access_token");
        assert!(SCOPES.contains(&"user:email"));
    }
}
