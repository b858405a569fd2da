//! Token authorization middleware (component G).
//!
//! Extracts and verifies a bearer token, checks its type and (optionally)
//! its role, then enforces user-id ownership — unless the token carries the
//! `admin` role, which is the one escape hatch from that check.

use crate::error::GatewayError;
use auth_core::{Payload, Role, TokenMaker, TokenType};
use uuid::Uuid;

/// Verify `authorization_header` as `"bearer <token>"`, require
/// `payload.token_type == expected_type`, and if `allowed_roles` is
/// `Some`, require `payload.role` be one of them. A `None` allowed-roles
/// list skips the role check entirely, matching every call site that
/// passes it for endpoints with no role restriction.
///
/// Non-admin callers must additionally own `user_id`: `payload.user_id`
/// must equal it. Admins bypass this ownership check.
pub fn authorize(
    authorization_header: Option<&str>,
    token_maker: &TokenMaker,
    expected_type: TokenType,
    allowed_roles: Option<&[Role]>,
    user_id: Uuid,
) -> Result<Payload, GatewayError> {
    let header = authorization_header.ok_or_else(GatewayError::unauthenticated)?;

    let parts: Vec<&str> = header.split_whitespace().collect();
    if parts.len() != 2 {
        return Err(GatewayError::unauthenticated());
    }
    let (scheme, token) = (parts[0], parts[1]);
    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(GatewayError::unauthenticated());
    }

    let payload = token_maker
        .verify_token(token)
        .map_err(|_| GatewayError::unauthenticated())?;

    if payload.token_type != expected_type {
        return Err(GatewayError::unauthenticated());
    }

    if let Some(roles) = allowed_roles {
        if !roles.contains(&payload.role) {
            return Err(GatewayError::unauthorized());
        }
    }

    if payload.role != Role::Admin && payload.user_id != user_id {
        return Err(GatewayError::unauthorized());
    }

    Ok(payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use auth_core::token::SYMMETRIC_KEY_LENGTH;

    fn maker() -> TokenMaker {
        TokenMaker::new(&[5u8; SYMMETRIC_KEY_LENGTH]).unwrap()
    }

    fn bearer(token_maker: &TokenMaker, user_id: Uuid, role: Role, token_type: TokenType) -> String {
        let (token, _) = token_maker
            .create_token(
                user_id,
                "0xd8dA6BF26964aF9D7eEd9e03E53415D37aA96045",
                role,
                token_type,
                chrono::Duration::minutes(15),
            )
            .unwrap();
        format!("bearer {token}")
    }

    #[test]
    fn valid_token_for_owning_user_succeeds() {
        let maker = maker();
        let user_id = Uuid::new_v4();
        let header = bearer(&maker, user_id, Role::User, TokenType::Access);

        let payload = authorize(
            Some(&header),
            &maker,
            TokenType::Access,
            Some(&[Role::User]),
            user_id,
        )
        .unwrap();
        assert_eq!(payload.user_id, user_id);
    }

    #[test]
    fn missing_header_is_unauthenticated() {
        let maker = maker();
        let err = authorize(None, &maker, TokenType::Access, None, Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, GatewayError::Unauthenticated(_)));
    }

    #[test]
    fn wrong_scheme_is_rejected() {
        let maker = maker();
        let user_id = Uuid::new_v4();
        let header = bearer(&maker, user_id, Role::User, TokenType::Access).replace("bearer", "basic");
        let err = authorize(Some(&header), &maker, TokenType::Access, None, user_id).unwrap_err();
        assert!(matches!(err, GatewayError::Unauthenticated(_)));
    }

    #[test]
    fn wrong_token_type_is_rejected() {
        let maker = maker();
        let user_id = Uuid::new_v4();
        let header = bearer(&maker, user_id, Role::User, TokenType::Refresh);
        let err = authorize(Some(&header), &maker, TokenType::Access, None, user_id).unwrap_err();
        assert!(matches!(err, GatewayError::Unauthenticated(_)));
    }

    #[test]
    fn none_allowed_roles_skips_role_check() {
        let maker = maker();
        let user_id = Uuid::new_v4();
        let header = bearer(&maker, user_id, Role::User, TokenType::Refresh);
        authorize(Some(&header), &maker, TokenType::Refresh, None, user_id).unwrap();
    }

    #[test]
    fn mismatched_user_id_is_rejected_unless_admin() {
        let maker = maker();
        let token_owner = Uuid::new_v4();
        let caller = Uuid::new_v4();
        let header = bearer(&maker, token_owner, Role::User, TokenType::Access);
        let err = authorize(Some(&header), &maker, TokenType::Access, None, caller).unwrap_err();
        assert!(matches!(err, GatewayError::PermissionDenied(_)));

        let admin_header = bearer(&maker, token_owner, Role::Admin, TokenType::Access);
        authorize(Some(&admin_header), &maker, TokenType::Access, None, caller).unwrap();
    }
}
