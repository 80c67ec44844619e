use super::state::GateState;

pub const PUBLIC_HOME: &str = "/";
pub const PRIVATE_HOME: &str = "/dashboard";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Public,
    Private,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    /// Landing page with the waitlist form and leaderboard.
    Landing,
    Dashboard,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    Render(View),
    Redirect(String),
    /// The session is not known yet; show a placeholder.
    Pending,
}

#[derive(Debug, Clone)]
struct Route {
    path: String,
    access: Access,
    view: View,
}

/// Path to access requirement and view, checked on every navigation.
#[derive(Debug, Clone)]
pub struct RouteTable {
    routes: Vec<Route>,
}

impl Default for RouteTable {
    fn default() -> Self {
        RouteTable::new()
            .route(PUBLIC_HOME, Access::Public, View::Landing)
            .route(PRIVATE_HOME, Access::Private, View::Dashboard)
    }
}

impl RouteTable {
    pub fn new() -> Self {
        RouteTable { routes: Vec::new() }
    }

    pub fn route(mut self, path: &str, access: Access, view: View) -> Self {
        self.routes.push(Route {
            path: normalize_path(path),
            access,
            view,
        });
        self
    }

    pub fn resolve(&self, path: &str, state: &GateState) -> Navigation {
        let path = normalize_path(path);
        let Some(route) = self.routes.iter().find(|route| route.path == path) else {
            return Navigation::Redirect(PUBLIC_HOME.to_string());
        };

        match (state, route.access) {
            (GateState::Initializing, _) => Navigation::Pending,
            (GateState::Anonymous, Access::Private) => Navigation::Redirect(PUBLIC_HOME.to_string()),
            (GateState::Authenticated(_), Access::Public) => {
                Navigation::Redirect(PRIVATE_HOME.to_string())
            }
            _ => Navigation::Render(route.view),
        }
    }
}

/// Drop query and fragment and any trailing slash.
fn normalize_path(path: &str) -> String {
    let path = path
        .split(|c: char| c == '?' || c == '#')
        .next()
        .unwrap_or_default();
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        PUBLIC_HOME.to_string()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}
