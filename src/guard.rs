use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

use crate::auth::{Role, Session};

// --- Route Classification ---

/// DashboardArea
///
/// The two sections of the authenticated user area. `Admin` pages are the
/// ones additionally restricted to the 'admin' role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DashboardArea {
    Account,
    Admin,
}

/// RouteClass
///
/// The mutually exclusive categories a request path falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteClass {
    /// Sign-in, sign-up and credential recovery pages.
    Auth,
    /// Anything under the authenticated user area.
    Dashboard(DashboardArea),
    /// The single page a banned user may see.
    Banned,
    Public,
}

impl RouteClass {
    pub fn is_dashboard(&self) -> bool {
        matches!(self, RouteClass::Dashboard(_))
    }

    pub fn is_admin_area(&self) -> bool {
        matches!(self, RouteClass::Dashboard(DashboardArea::Admin))
    }
}

/// PathMatch
///
/// How a rule is matched against the raw request path. Prefix matching is a
/// plain string prefix test, so `/login-help` is still an auth page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PathMatch {
    Exact(String),
    Prefix(String),
}

impl PathMatch {
    pub fn matches(&self, path: &str) -> bool {
        match self {
            PathMatch::Exact(expected) => path == expected,
            PathMatch::Prefix(prefix) => path.starts_with(prefix.as_str()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRule {
    pub pattern: PathMatch,
    pub class: RouteClass,
}

impl RouteRule {
    pub fn exact(path: &str, class: RouteClass) -> Self {
        Self {
            pattern: PathMatch::Exact(path.to_string()),
            class,
        }
    }

    pub fn prefix(prefix: &str, class: RouteClass) -> Self {
        Self {
            pattern: PathMatch::Prefix(prefix.to_string()),
            class,
        }
    }
}

/// RouteTable
///
/// Static prefix table mapping request paths to a `RouteClass`. It is plain
/// data (serde-loadable from JSON) so deployments can extend it and tests can
/// exercise classification without the guard.
///
/// Rules are evaluated in order and the first match wins. A path matching no
/// rule is `RouteClass::Public`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteTable {
    pub rules: Vec<RouteRule>,
}

impl Default for RouteTable {
    fn default() -> Self {
        use DashboardArea::{Account, Admin};

        Self {
            rules: vec![
                RouteRule::exact("/banned", RouteClass::Banned),
                RouteRule::prefix("/login", RouteClass::Auth),
                RouteRule::prefix("/register", RouteClass::Auth),
                RouteRule::prefix("/forgot-password", RouteClass::Auth),
                RouteRule::prefix("/reset-password", RouteClass::Auth),
                RouteRule::prefix("/verify-email", RouteClass::Auth),
                RouteRule::prefix("/account", RouteClass::Dashboard(Account)),
                RouteRule::prefix("/admin", RouteClass::Dashboard(Admin)),
            ],
        }
    }
}

impl RouteTable {
    /// Parses a table from its JSON form, e.g.
    /// `{"rules":[{"pattern":{"prefix":"/billing"},"class":{"dashboard":"account"}}]}`.
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn classify(&self, path: &str) -> RouteClass {
        self.rules
            .iter()
            .find(|rule| rule.pattern.matches(path))
            .map(|rule| rule.class)
            .unwrap_or(RouteClass::Public)
    }
}

// --- Decisions ---

/// RedirectTarget
///
/// Every destination the guard can rewrite a request to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RedirectTarget {
    Banned,
    Login,
    VerifyEmail,
    Account,
    Admin,
}

impl RedirectTarget {
    pub fn path(&self) -> &'static str {
        match self {
            RedirectTarget::Banned => "/banned",
            RedirectTarget::Login => "/login",
            RedirectTarget::VerifyEmail => "/verify-email",
            RedirectTarget::Account => "/account",
            RedirectTarget::Admin => "/admin",
        }
    }

    /// The dashboard root for a user with the given role.
    pub fn dashboard_for(role: Option<&Role>) -> Self {
        if is_admin(role) {
            RedirectTarget::Admin
        } else {
            RedirectTarget::Account
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Proceed,
    Redirect(RedirectTarget),
}

/// is_admin
///
/// Membership test over both role shapes: a scalar role must equal "admin",
/// a role list must contain it. A missing role is never admin.
pub fn is_admin(role: Option<&Role>) -> bool {
    role.is_some_and(|role| role.contains("admin"))
}

/// AccessGuard
///
/// Maps `(session, path)` to a single `Decision`. The guard never fetches the
/// session itself and holds no per-request state, so one instance is shared by
/// every request.
#[derive(Debug, Clone, Default)]
pub struct AccessGuard {
    routes: RouteTable,
}

impl AccessGuard {
    pub fn new(routes: RouteTable) -> Self {
        Self { routes }
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// decide
    ///
    /// Guard clauses are evaluated in a fixed order and the first one that
    /// applies wins. `ban_expires` is not consulted: the session provider
    /// clears `banned` once a temporary ban has run out.
    pub fn decide(&self, session: Option<&Session>, path: &str) -> Decision {
        let page = self.routes.classify(path);
        let user = session.map(|s| &s.user);
        let banned = user.is_some_and(|u| u.banned);
        let on_verify_page = path == RedirectTarget::VerifyEmail.path();

        if banned && page != RouteClass::Banned {
            return Decision::Redirect(RedirectTarget::Banned);
        }

        let Some(user) = user else {
            if page.is_dashboard() {
                return Decision::Redirect(RedirectTarget::Login);
            }
            return Decision::Proceed;
        };
        let role = user.role.as_ref();

        // Unverified users stay on the auth pages so the verify page is reachable.
        if page == RouteClass::Auth && !banned && user.email_verified {
            return Decision::Redirect(RedirectTarget::dashboard_for(role));
        }

        // Unverified callers fall through to the verify-email redirect so the
        // first redirect is always the final one.
        if page.is_admin_area() && !banned && user.email_verified && !is_admin(role) {
            return Decision::Redirect(RedirectTarget::Account);
        }

        if !user.email_verified && page.is_dashboard() && !on_verify_page {
            return Decision::Redirect(RedirectTarget::VerifyEmail);
        }

        if user.email_verified && on_verify_page {
            return Decision::Redirect(RedirectTarget::dashboard_for(role));
        }

        Decision::Proceed
    }
}

static DEFAULT_GUARD: LazyLock<AccessGuard> = LazyLock::new(AccessGuard::default);

/// decide
///
/// Entry point over the default route table.
pub fn decide(session: Option<&Session>, path: &str) -> Decision {
    DEFAULT_GUARD.decide(session, path)
}
