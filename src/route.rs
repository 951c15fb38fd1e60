//! Routing descriptors and the call context that carries them.

/// Where a statement is routed: logical database, shard key and replica choice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub db_name: String,
    pub shard_key: u64,
    /// Target the offline replica, which allows GROUP BY / HAVING
    pub offline: bool,
}

impl Route {
    pub fn new(db_name: impl Into<String>, shard_key: u64, offline: bool) -> Self {
        Self {
            db_name: db_name.into(),
            shard_key,
            offline,
        }
    }

    /// The route with an empty database name replaced by `default_db`.
    pub fn resolve(&self, default_db: &str) -> Route {
        let mut route = self.clone();
        if route.db_name.is_empty() {
            route.db_name = default_db.to_string();
        }
        route
    }
}

/// Execution context threaded through every call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Context {
    route: Option<Route>,
}

impl Context {
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_route(mut self, route: Route) -> Self {
        self.route = Some(route);
        self
    }

    pub fn route(&self) -> Option<&Route> {
        self.route.as_ref()
    }
}

/// Derives a context carrying the given routing descriptor.
pub fn set_route(ctx: &Context, db_name: &str, shard_key: u64, offline: bool) -> Context {
    ctx.clone().with_route(Route::new(db_name, shard_key, offline))
}

pub fn get_route(ctx: &Context) -> Option<&Route> {
    ctx.route()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_get_route() {
        let ctx = Context::background();
        assert!(get_route(&ctx).is_none());

        let routed = set_route(&ctx, "orders", 391165030316115969, false);
        let route = get_route(&routed).unwrap();
        assert_eq!(route.db_name, "orders");
        assert_eq!(route.shard_key, 391165030316115969);
        assert!(!route.offline);

        // the parent context is untouched
        assert!(get_route(&ctx).is_none());
    }

    #[test]
    fn test_resolve_default_database() {
        let route = Route::new("", 1, true);
        assert_eq!(route.resolve("users").db_name, "users");
        assert_eq!(Route::new("orders", 1, true).resolve("users").db_name, "orders");
    }
}
