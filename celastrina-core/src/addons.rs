use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;

use crate::configuration::Configuration;
use crate::context::Context;
use crate::envelope::Envelope;
use crate::error::CelastrinaError;
use crate::lifecycle::LifecycleState;

/// The event handed to a subscribed add-on at each lifecycle stage.
pub struct LifecycleEvent<'a, 'b> {
    pub state: LifecycleState,
    /// Name of the configuration driving the invocation.
    pub source: &'a str,
    pub context: &'a mut Context,
    /// Set when the lifecycle diverted to the exception stage.
    pub error: Option<&'b CelastrinaError>,
}

/// A named, dependency-declaring plug-in with lifecycle hooks.
///
/// Add-ons are registered on the configuration and installed in dependency
/// order when the configuration bootstraps. `do_lifecycle` fires only for
/// the states in `lifecycle_hooks`, after the author's handler for that
/// stage returns.
pub trait AddOn: Send + Sync {
    fn name(&self) -> &str;

    /// Names of add-ons that must install before this one.
    fn dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    /// Lifecycle states this add-on subscribes to.
    fn lifecycle_hooks(&self) -> Vec<LifecycleState> {
        Vec::new()
    }

    /// Apply a configuration-document block addressed to this add-on.
    fn configure(&self, _config: &serde_json::Value) -> Result<(), CelastrinaError> {
        Ok(())
    }

    fn install<'a>(
        &'a self,
        _envelope: &'a dyn Envelope,
    ) -> Pin<Box<dyn Future<Output = Result<(), CelastrinaError>> + Send + 'a>> {
        Box::pin(std::future::ready(Ok(())))
    }

    fn initialize<'a>(
        &'a self,
        _envelope: &'a dyn Envelope,
        _configuration: &'a Configuration,
    ) -> Pin<Box<dyn Future<Output = Result<(), CelastrinaError>> + Send + 'a>> {
        Box::pin(std::future::ready(Ok(())))
    }

    fn do_lifecycle<'a, 'b, 'c>(
        &'a self,
        _event: &'a mut LifecycleEvent<'b, 'c>,
    ) -> Pin<Box<dyn Future<Output = Result<(), CelastrinaError>> + Send + 'a>>
    where
        'b: 'a,
        'c: 'a,
    {
        Box::pin(std::future::ready(Ok(())))
    }
}

/// Resolves add-on dependencies into a deterministic install order.
///
/// `target` holds the accepted, ordered add-ons; `unresolved` holds add-ons
/// whose dependencies have not all been accepted yet. Every accepted add-on
/// triggers a re-scan of the unresolved pool, so insertion order is
/// preserved within a dependency tier.
#[derive(Default)]
pub struct AddOnManager {
    target: Vec<Box<dyn AddOn>>,
    unresolved: Vec<Box<dyn AddOn>>,
}

impl AddOnManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn accepted(&self) -> HashSet<&str> {
        self.target.iter().map(|a| a.name()).collect()
    }

    /// Register an add-on, accepting it immediately when its dependencies
    /// are already in place and re-scanning the unresolved pool to a
    /// fixpoint afterwards.
    pub fn add(&mut self, add_on: Box<dyn AddOn>) {
        let satisfied = {
            let accepted = self.accepted();
            add_on
                .dependencies()
                .iter()
                .all(|d| accepted.contains(d.as_str()))
        };
        if satisfied {
            self.target.push(add_on);
            self.settle();
        } else {
            self.unresolved.push(add_on);
        }
    }

    fn settle(&mut self) {
        loop {
            let accepted: HashSet<String> =
                self.target.iter().map(|a| a.name().to_string()).collect();
            let position = self.unresolved.iter().position(|a| {
                a.dependencies().iter().all(|d| accepted.contains(d))
            });
            match position {
                Some(index) => {
                    let add_on = self.unresolved.remove(index);
                    self.target.push(add_on);
                }
                None => break,
            }
        }
    }

    /// Accepted add-on names in install order.
    pub fn names(&self) -> Vec<String> {
        self.target.iter().map(|a| a.name().to_string()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&dyn AddOn> {
        self.target
            .iter()
            .chain(self.unresolved.iter())
            .find(|a| a.name() == name)
            .map(|a| a.as_ref())
    }

    pub fn is_empty(&self) -> bool {
        self.target.is_empty() && self.unresolved.is_empty()
    }

    /// Install every accepted add-on in order.
    ///
    /// Fails with a configuration error naming every unresolved add-on and
    /// its missing dependencies (an unresolvable pool means the declared
    /// graph has a cycle or references an unknown add-on).
    pub async fn install(&self, envelope: &dyn Envelope) -> Result<(), CelastrinaError> {
        if !self.unresolved.is_empty() {
            let accepted = self.accepted();
            let detail: Vec<String> = self
                .unresolved
                .iter()
                .map(|a| {
                    let missing: Vec<String> = a
                        .dependencies()
                        .into_iter()
                        .filter(|d| !accepted.contains(d.as_str()))
                        .collect();
                    format!("{} (missing: {})", a.name(), missing.join(", "))
                })
                .collect();
            return Err(CelastrinaError::configuration(format!(
                "unresolved add-on dependencies: {}",
                detail.join("; ")
            )));
        }
        for add_on in &self.target {
            tracing::debug!(add_on = add_on.name(), "installing add-on");
            add_on.install(envelope).await?;
        }
        Ok(())
    }

    /// Initialize every accepted add-on in install order.
    pub async fn initialize(
        &self,
        envelope: &dyn Envelope,
        configuration: &Configuration,
    ) -> Result<(), CelastrinaError> {
        for add_on in &self.target {
            add_on.initialize(envelope, configuration).await?;
        }
        Ok(())
    }

    /// Fire the lifecycle hook for a stage on every subscribed add-on, in
    /// install order.
    pub async fn do_lifecycle(
        &self,
        state: LifecycleState,
        source: &str,
        context: &mut Context,
        error: Option<&CelastrinaError>,
    ) -> Result<(), CelastrinaError> {
        for add_on in &self.target {
            if !add_on.lifecycle_hooks().contains(&state) {
                continue;
            }
            let mut event = LifecycleEvent {
                state,
                source,
                context: &mut *context,
                error,
            };
            add_on.do_lifecycle(&mut event).await?;
        }
        Ok(())
    }
}
