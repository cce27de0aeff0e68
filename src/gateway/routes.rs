//! 网关路由表：最长前缀匹配

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayRoute {
    pub prefix: &'static str,
    pub service: &'static str,
    pub protected: bool,
}

const fn route(prefix: &'static str, service: &'static str, protected: bool) -> GatewayRoute {
    GatewayRoute {
        prefix,
        service,
        protected,
    }
}

/// 网关识别的上游服务
pub const SERVICES: &[&str] = &[
    "auth",
    "academic",
    "attendance",
    "assessment",
    "admission",
    "finance",
    "notification",
    "file",
];

#[derive(Debug, Clone)]
pub struct RouteTable {
    routes: Vec<GatewayRoute>,
}

impl Default for RouteTable {
    fn default() -> Self {
        Self::new(vec![
            route("/api/v1/health", "auth", false),
            route("/api/v1/auth/", "auth", false),
            route("/api/v1/users", "auth", true),
            route("/api/v1/audit-logs", "auth", true),
            route("/api/v1/schools/", "academic", true),
            route("/api/v1/classes/", "academic", true),
            route("/api/v1/subjects/", "academic", true),
            route("/api/v1/attendance/", "attendance", true),
            route("/api/v1/grades/", "assessment", true),
            route("/api/v1/reports/", "assessment", true),
            route("/api/v1/admissions/", "admission", true),
            route("/api/v1/finance/", "finance", true),
            route("/api/v1/notifications/", "notification", true),
            route("/api/v1/files/", "file", true),
        ])
    }
}

impl RouteTable {
    pub fn new(routes: Vec<GatewayRoute>) -> Self {
        Self { routes }
    }

    pub fn resolve(&self, path: &str) -> Option<&GatewayRoute> {
        self.routes
            .iter()
            .filter(|r| path.starts_with(r.prefix))
            .max_by_key(|r| r.prefix.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve() {
        let table = RouteTable::default();

        let r = table.resolve("/api/v1/auth/login").unwrap();
        assert_eq!((r.service, r.protected), ("auth", false));

        let r = table.resolve("/api/v1/users/123/roles").unwrap();
        assert_eq!((r.service, r.protected), ("auth", true));

        assert_eq!(table.resolve("/api/v1/grades/9").unwrap().service, "assessment");
        assert!(table.resolve("/api/v2/users").is_none());
        assert!(table.resolve("/").is_none());
    }

    #[test]
    fn test_longest_prefix_wins() {
        let table = RouteTable::new(vec![
            route("/api/v1/", "auth", false),
            route("/api/v1/files/", "file", true),
        ]);
        assert_eq!(table.resolve("/api/v1/files/a.pdf").unwrap().service, "file");
        assert_eq!(table.resolve("/api/v1/other").unwrap().service, "auth");
    }

    #[test]
    fn test_every_route_targets_known_service() {
        for r in &RouteTable::default().routes {
            assert!(SERVICES.contains(&r.service), "{}", r.service);
        }
    }
}
