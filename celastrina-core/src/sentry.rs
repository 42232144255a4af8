use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use serde::Deserialize;

use crate::asserter::Asserter;
use crate::context::Context;
use crate::error::CelastrinaError;
use crate::subject::Subject;

/// One link in the sentry's authentication chain.
///
/// Authenticators record their outcome on the request's [`Asserter`] under
/// their own name. A `required` authenticator that does not affirm its
/// assertion fails the whole authentication with a 401.
pub trait Authenticator: Send + Sync {
    fn name(&self) -> &str;

    fn required(&self) -> bool {
        false
    }

    fn authenticate<'a>(
        &'a self,
        context: &'a Context,
        asserter: &'a mut Asserter,
    ) -> Pin<Box<dyn Future<Output = Result<(), CelastrinaError>> + Send + 'a>>;
}

/// Always-affirming authenticator for open/anonymous functions.
///
/// Optionally assigns a static role set to every subject it admits.
pub struct OpenAuthenticator {
    name: String,
    assignments: Vec<String>,
}

impl OpenAuthenticator {
    pub fn new() -> Self {
        Self {
            name: "Open".to_string(),
            assignments: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_assignments<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.assignments.extend(roles.into_iter().map(Into::into));
        self
    }
}

impl Default for OpenAuthenticator {
    fn default() -> Self {
        Self::new()
    }
}

impl Authenticator for OpenAuthenticator {
    fn name(&self) -> &str {
        &self.name
    }

    fn authenticate<'a>(
        &'a self,
        _context: &'a Context,
        asserter: &'a mut Asserter,
    ) -> Pin<Box<dyn Future<Output = Result<(), CelastrinaError>> + Send + 'a>> {
        let result = asserter.assert_with(&self.name, true, self.assignments.iter().cloned(), None);
        Box::pin(std::future::ready(result))
    }
}

/// Produces additional roles for an authenticated subject.
pub trait RoleFactory: Send + Sync {
    fn get_subject_roles<'a>(
        &'a self,
        context: &'a Context,
        subject: &'a Subject,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<String>, CelastrinaError>> + Send + 'a>>;
}

/// Role factory that contributes nothing.
#[derive(Debug, Default)]
pub struct DefaultRoleFactory;

impl RoleFactory for DefaultRoleFactory {
    fn get_subject_roles<'a>(
        &'a self,
        _context: &'a Context,
        _subject: &'a Subject,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<String>, CelastrinaError>> + Send + 'a>> {
        Box::pin(std::future::ready(Ok(Vec::new())))
    }
}

/// A principal-to-roles mapping entry, as carried by the configuration
/// document's `PrincipalMapping` attribute.
#[derive(Clone, Debug, Deserialize)]
pub struct PrincipalMapping {
    pub principal: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

/// Role factory driven by [`PrincipalMapping`] entries: subjects whose id
/// matches a mapped principal receive the mapped roles.
#[derive(Debug, Default)]
pub struct MappedRoleFactory {
    mappings: HashMap<String, Vec<String>>,
}

impl MappedRoleFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_mappings(mappings: impl IntoIterator<Item = PrincipalMapping>) -> Self {
        let mut map = HashMap::new();
        for mapping in mappings {
            map.insert(mapping.principal, mapping.roles);
        }
        Self { mappings: map }
    }

    pub fn add_mapping(&mut self, mapping: PrincipalMapping) {
        self.mappings.insert(mapping.principal, mapping.roles);
    }
}

impl RoleFactory for MappedRoleFactory {
    fn get_subject_roles<'a>(
        &'a self,
        _context: &'a Context,
        subject: &'a Subject,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<String>, CelastrinaError>> + Send + 'a>> {
        let roles = self.mappings.get(subject.id()).cloned().unwrap_or_default();
        Box::pin(std::future::ready(Ok(roles)))
    }
}

/// Owns authentication and authorization for one invocation.
pub struct Sentry {
    authenticators: Vec<Box<dyn Authenticator>>,
    role_factory: Box<dyn RoleFactory>,
}

impl Sentry {
    pub fn new() -> Self {
        Self {
            authenticators: Vec::new(),
            role_factory: Box::new(DefaultRoleFactory),
        }
    }

    pub fn add_authenticator(&mut self, authenticator: Box<dyn Authenticator>) {
        self.authenticators.push(authenticator);
    }

    pub fn set_role_factory(&mut self, role_factory: Box<dyn RoleFactory>) {
        self.role_factory = role_factory;
    }

    /// Run the authenticator chain and produce the request subject.
    ///
    /// The bare subject starts with `id = context.request_id()`. Every
    /// authenticator runs in order; a required authenticator whose assertion
    /// is not affirmative fails with 401. Staged role assignments and the
    /// role factory's roles are unioned into the subject before it is
    /// returned.
    pub async fn authenticate(&self, context: &Context) -> Result<Subject, CelastrinaError> {
        let mut subject = Subject::new(context.request_id());
        let mut asserter = Asserter::new();

        for authenticator in &self.authenticators {
            authenticator.authenticate(context, &mut asserter).await?;
            if authenticator.required() && !asserter.is_affirmed(authenticator.name()) {
                tracing::warn!(
                    authenticator = authenticator.name(),
                    request = context.request_id(),
                    "required authenticator did not affirm"
                );
                return Err(CelastrinaError::auth(format!(
                    "required authenticator '{}' did not produce an affirmative assertion",
                    authenticator.name()
                )));
            }
        }

        asserter.assign(&mut subject);
        let roles = self
            .role_factory
            .get_subject_roles(context, &subject)
            .await?;
        subject.add_roles(roles);
        Ok(subject)
    }

    /// Authorize the request subject against the declared action.
    ///
    /// A missing permission permits only under the configuration's
    /// optimistic flag; a present permission decides via its value match.
    pub async fn authorize(&self, context: &Context) -> Result<(), CelastrinaError> {
        let subject = context
            .subject()
            .ok_or_else(|| CelastrinaError::auth("no authenticated subject on the request"))?;
        let configuration = context.configuration();
        let permissions = configuration.permissions()?;

        match permissions.get_permission(context.action()) {
            Some(permission) => {
                if permission.authorize(subject) {
                    Ok(())
                } else {
                    Err(CelastrinaError::access(format!(
                        "subject '{}' denied action '{}'",
                        subject.id(),
                        context.action()
                    )))
                }
            }
            None if configuration.optimistic() => Ok(()),
            None => Err(CelastrinaError::access(format!(
                "no permission declared for action '{}'",
                context.action()
            ))),
        }
    }
}

impl Default for Sentry {
    fn default() -> Self {
        Self::new()
    }
}
