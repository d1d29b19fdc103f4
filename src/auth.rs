use crate::db::{MysqlPool, insert_user, lookup_password};
use crate::http::request::{AuthTag, HttpRequest};

/// Authentication path (C10): runs the login/register branch against a
/// leased DB session and rewrites `request.path` to the welcome or error
/// page, mirroring the original `UserVerify`'s redirect contract. No-op if
/// the request isn't targeting `/login.html` or `/register.html`.
pub fn authenticate(request: &mut HttpRequest, pool: &MysqlPool) {
    let Some(tag) = request.auth_tag() else {
        return;
    };

    let username = request.post.get("username").cloned().unwrap_or_default();
    let password = request.post.get("password").cloned().unwrap_or_default();

    if username.is_empty() || password.is_empty() {
        request.path = "/error.html".to_string();
        return;
    }

    let Ok(mut conn) = pool.lease() else {
        request.path = "/error.html".to_string();
        return;
    };
    let verified = match tag {
        AuthTag::Login => matches!(
            lookup_password(&mut conn, &username),
            Ok(Some(stored)) if stored == password
        ),
        AuthTag::Register => match lookup_password(&mut conn, &username) {
            Ok(Some(_)) => false, // username already taken
            Ok(None) => insert_user(&mut conn, &username, &password).is_ok(),
            Err(_) => false,
        },
    };
    drop(conn);

    request.path = if verified { "/welcome.html" } else { "/error.html" }.to_string();
}
