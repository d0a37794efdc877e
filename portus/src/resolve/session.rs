use super::{Resolve, ResolvedAction};
use crate::http::{Method, Request};
use crate::session::CredentialStore;

use serde::Serialize;
use tracing::{debug, info, warn};

/// Name of the cookie carrying the session token.
pub const SESSION_COOKIE: &str = "session_id";

const EXPIRED: &str = "expires=Thu, 01 Jan 1970 00:00:00 GMT";

#[derive(Serialize)]
struct UserInfo<'a> {
    username: &'a str,
}

/// Session gate layered over another resolver.
///
/// Handles `POST /login`, `POST /register`, `GET /logout`, and
/// `GET /userinfo`, and requires a valid session cookie for protected path
/// prefixes: a missing cookie gets 401 and an unknown token 403. Everything
/// else is passed to the inner resolver untouched.
pub struct SessionResolver<R, S> {
    inner: R,
    store: S,
    protected: Vec<String>,
}

impl<R: Resolve, S: CredentialStore> SessionResolver<R, S> {
    /// Protects `/download/`, `/userinfo`, and `/logout` by default.
    pub fn new(inner: R, store: S) -> Self {
        Self {
            inner,
            store,
            protected: vec![
                "/download/".to_owned(),
                "/userinfo".to_owned(),
                "/logout".to_owned(),
            ],
        }
    }

    /// Adds a protected path prefix.
    pub fn protect(mut self, prefix: impl Into<String>) -> Self {
        self.protected.push(prefix.into());
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn is_protected(&self, path: &str) -> bool {
        self.protected.iter().any(|prefix| path.starts_with(prefix))
    }

    /// Resolves a fixed page through the inner resolver.
    fn page(&self, request: &Request, path: &str) -> ResolvedAction {
        let mut forward = request.clone();
        forward.method = Method::Get;
        forward.path = path.to_owned();
        forward.body.clear();

        self.inner.resolve(&forward)
    }

    fn start_session(&self, request: &Request, identity: &str) -> ResolvedAction {
        match self.store.issue_session(identity) {
            Some(token) => {
                info!(identity, "session started");
                self.page(request, "/welcome.html")
                    .with_cookie(format!("{SESSION_COOKIE}={token}; path=/; HttpOnly"))
            }
            None => ResolvedAction::error(500),
        }
    }

    fn login(&self, request: &Request) -> ResolvedAction {
        let form = request.form();
        let identity = form.get("username").map(String::as_str).unwrap_or("");
        let secret = form.get("password").map(String::as_str).unwrap_or("");

        if self.store.verify(identity, secret) {
            self.start_session(request, identity)
        } else {
            debug!(identity, "login refused");
            self.page(request, "/error.html")
        }
    }

    fn register(&self, request: &Request) -> ResolvedAction {
        let form = request.form();
        let identity = form.get("username").map(String::as_str).unwrap_or("");
        let secret = form.get("password").map(String::as_str).unwrap_or("");

        if self.store.create(identity, secret) {
            self.start_session(request, identity)
        } else {
            debug!(identity, "registration refused");
            self.page(request, "/error.html")
        }
    }

    fn authenticated(&self, request: &Request, token: &str, identity: &str) -> ResolvedAction {
        match request.path.as_str() {
            "/logout" => {
                if self.store.revoke(token) {
                    info!(identity, "session ended");
                    self.page(request, "/user.html")
                        .with_cookie(format!("{SESSION_COOKIE}=; {EXPIRED}; path=/; HttpOnly"))
                } else {
                    self.page(request, "/error.html")
                }
            }
            "/userinfo" => match serde_json::to_string(&UserInfo { username: identity }) {
                Ok(json) => ResolvedAction::json(200, json),
                Err(e) => {
                    warn!(error = %e, "failed to encode user info");
                    ResolvedAction::error(500)
                }
            },
            _ => self.inner.resolve(request),
        }
    }
}

impl<R: Resolve, S: CredentialStore> Resolve for SessionResolver<R, S> {
    fn resolve(&self, request: &Request) -> ResolvedAction {
        match (&request.method, request.path.as_str()) {
            (Method::Post, "/login") => return self.login(request),
            (Method::Post, "/register") => return self.register(request),
            _ => {}
        }

        if !self.is_protected(&request.path) {
            return self.inner.resolve(request);
        }

        let cookies = request.cookies();
        let Some(token) = cookies.get(SESSION_COOKIE).filter(|token| !token.is_empty()) else {
            return ResolvedAction::error(401);
        };

        match self.store.lookup(token) {
            Some(identity) => self.authenticated(request, token, &identity),
            None => ResolvedAction::error(403),
        }
    }
}
