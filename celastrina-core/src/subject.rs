use std::collections::{HashMap, HashSet};

/// The authenticated principal for one request.
///
/// Created bare by the sentry at the start of authentication. Roles are
/// additive while the authenticator chain and the role factory run, and the
/// subject is treated as read-only once authorization starts.
#[derive(Clone, Debug)]
pub struct Subject {
    id: String,
    roles: HashSet<String>,
    claims: HashMap<String, serde_json::Value>,
}

impl Subject {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            roles: HashSet::new(),
            claims: HashMap::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn roles(&self) -> &HashSet<String> {
        &self.roles
    }

    /// Add a single role. Duplicates are ignored.
    pub fn add_role(&mut self, role: impl Into<String>) {
        self.roles.insert(role.into());
    }

    /// Union a batch of roles into the subject.
    pub fn add_roles<I, S>(&mut self, roles: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roles.extend(roles.into_iter().map(Into::into));
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }

    pub fn has_any_role<'a>(&self, roles: impl IntoIterator<Item = &'a str>) -> bool {
        roles.into_iter().any(|r| self.roles.contains(r))
    }

    pub fn claim(&self, name: &str) -> Option<&serde_json::Value> {
        self.claims.get(name)
    }

    pub fn set_claim(&mut self, name: impl Into<String>, value: serde_json::Value) {
        self.claims.insert(name.into(), value);
    }

    pub fn claims(&self) -> &HashMap<String, serde_json::Value> {
        &self.claims
    }
}
