//! Navigable paths and the profile guard.

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "route", content = "param", rename_all = "snake_case")]
pub enum Route {
    Home,
    Task(String),
    Project(String),
    /// Optional title query (`/search?q=...`).
    Search(Option<String>),
    FiltersLabels,
    Login,
    Profile,
    NotFound,
}

/// Outcome of resolving a path for the current session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    Allow(Route),
    Redirect(Route),
}

impl Route {
    /// Resolve a path, with optional query string, to a route.
    pub fn parse(path: &str) -> Route {
        let (path, query) = match path.split_once('?') {
            Some((p, q)) => (p, Some(q)),
            None => (path, None),
        };
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

        match segments.as_slice() {
            [] => Route::Home,
            ["task", id] => match decode(id) {
                Some(id) => Route::Task(id),
                None => Route::NotFound,
            },
            ["project", id] => match decode(id) {
                Some(id) => Route::Project(id),
                None => Route::NotFound,
            },
            ["search"] => Route::Search(query.and_then(search_term)),
            ["filters-labels"] => Route::FiltersLabels,
            ["login"] => Route::Login,
            ["profile"] => Route::Profile,
            _ => Route::NotFound,
        }
    }

    pub fn path(&self) -> String {
        match self {
            Route::Home => "/".to_string(),
            Route::Task(id) => format!("/task/{}", urlencoding::encode(id)),
            Route::Project(id) => format!("/project/{}", urlencoding::encode(id)),
            Route::Search(None) => "/search".to_string(),
            Route::Search(Some(q)) => format!("/search?q={}", urlencoding::encode(q)),
            Route::FiltersLabels => "/filters-labels".to_string(),
            Route::Login => "/login".to_string(),
            Route::Profile => "/profile".to_string(),
            Route::NotFound => "/404".to_string(),
        }
    }

    pub fn requires_auth(&self) -> bool {
        matches!(self, Route::Profile)
    }

    /// Apply the auth guard: guarded routes redirect to login when signed out.
    pub fn guard(self, signed_in: bool) -> Navigation {
        if self.requires_auth() && !signed_in {
            Navigation::Redirect(Route::Login)
        } else {
            Navigation::Allow(self)
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

fn decode(segment: &str) -> Option<String> {
    urlencoding::decode(segment)
        .ok()
        .map(|s| s.into_owned())
        .filter(|s| !s.is_empty())
}

fn search_term(query: &str) -> Option<String> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == "q")
        .and_then(|(_, value)| decode(&value.replace('+', " ")))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_path() {
        assert_eq!(Route::parse("/"), Route::Home);
        assert_eq!(Route::parse(""), Route::Home);
        assert_eq!(Route::parse("/task/abc"), Route::Task("abc".to_string()));
        assert_eq!(Route::parse("/project/p%201/"), Route::Project("p 1".to_string()));
        assert_eq!(Route::parse("/search"), Route::Search(None));
        assert_eq!(
            Route::parse("/search?q=pay+rent"),
            Route::Search(Some("pay rent".to_string()))
        );
        assert_eq!(Route::parse("/filters-labels"), Route::FiltersLabels);
        assert_eq!(Route::parse("/login"), Route::Login);
        assert_eq!(Route::parse("/profile"), Route::Profile);
    }

    #[test]
    fn unknown_paths_are_not_found() {
        assert_eq!(Route::parse("/nope"), Route::NotFound);
        assert_eq!(Route::parse("/task"), Route::NotFound);
        assert_eq!(Route::parse("/task/a/b"), Route::NotFound);
    }

    #[test]
    fn paths_round_trip() {
        for route in [
            Route::Home,
            Route::Task("t/1".to_string()),
            Route::Project("home".to_string()),
            Route::Search(Some("a&b".to_string())),
            Route::FiltersLabels,
            Route::Login,
            Route::Profile,
        ] {
            assert_eq!(Route::parse(&route.path()), route);
        }
    }

    #[test]
    fn only_profile_is_guarded() {
        assert_eq!(
            Route::Profile.guard(false),
            Navigation::Redirect(Route::Login)
        );
        assert_eq!(Route::Profile.guard(true), Navigation::Allow(Route::Profile));
        assert_eq!(Route::Home.guard(false), Navigation::Allow(Route::Home));
        assert_eq!(
            Route::Task("t".to_string()).guard(false),
            Navigation::Allow(Route::Task("t".to_string()))
        );
    }
}
