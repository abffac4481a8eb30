//! フィードのBasic認証

use crate::config::Credentials;
use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::{engine::general_purpose::STANDARD, Engine};

/// Basic認証ミドルウェア
///
/// 認証情報が未設定なら素通しする。不一致は401。
pub async fn basic_auth_middleware(
    State(credentials): State<Option<Credentials>>,
    request: Request,
    next: Next,
) -> Result<Response, Response> {
    let Some(expected) = credentials else {
        return Ok(next.run(request).await);
    };

    match parse_basic_auth(request.headers()) {
        Some((user, password)) if user == expected.username && password == expected.password => {
            Ok(next.run(request).await)
        }
        Some((user, _)) => {
            tracing::warn!(user = %user, "Feed authentication failed");
            Err(unauthorized())
        }
        None => Err(unauthorized()),
    }
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, "Basic realm=\"sensord\"")],
        "Unauthorized",
    )
        .into_response()
}

/// `Authorization: Basic ...` から (ユーザー, パスワード) を取り出す
pub fn parse_basic_auth(headers: &HeaderMap) -> Option<(String, String)> {
    let encoded = headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Basic ")?;
    let decoded = String::from_utf8(STANDARD.decode(encoded.trim()).ok()?).ok()?;
    let (user, password) = decoded.split_once(':')?;
    Some((user.to_string(), password.to_string()))
}
