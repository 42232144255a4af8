use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::configuration::Configuration;
use crate::context::Context;
use crate::envelope::{Completion, Envelope};
use crate::error::CelastrinaError;

/// The ordered stages of one invocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LifecycleState {
    Initialize,
    Authenticate,
    Authorize,
    Validate,
    Load,
    Process,
    Monitor,
    Save,
    Exception,
    Terminate,
}

impl LifecycleState {
    pub const ALL: [LifecycleState; 10] = [
        LifecycleState::Initialize,
        LifecycleState::Authenticate,
        LifecycleState::Authorize,
        LifecycleState::Validate,
        LifecycleState::Load,
        LifecycleState::Process,
        LifecycleState::Monitor,
        LifecycleState::Save,
        LifecycleState::Exception,
        LifecycleState::Terminate,
    ];
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LifecycleState::Initialize => "initialize",
            LifecycleState::Authenticate => "authenticate",
            LifecycleState::Authorize => "authorize",
            LifecycleState::Validate => "validate",
            LifecycleState::Load => "load",
            LifecycleState::Process => "process",
            LifecycleState::Monitor => "monitor",
            LifecycleState::Save => "save",
            LifecycleState::Exception => "exception",
            LifecycleState::Terminate => "terminate",
        };
        f.write_str(name)
    }
}

/// The author-supplied business logic of a function.
///
/// Only `process` is required; the remaining stage handlers default to
/// no-ops. Handlers must be safe to run on any worker — the host dispatches
/// invocations concurrently.
pub trait Function: Send + Sync {
    fn initialize<'a>(
        &'a self,
        _context: &'a mut Context,
    ) -> Pin<Box<dyn Future<Output = Result<(), CelastrinaError>> + Send + 'a>> {
        Box::pin(std::future::ready(Ok(())))
    }

    fn validate<'a>(
        &'a self,
        _context: &'a mut Context,
    ) -> Pin<Box<dyn Future<Output = Result<(), CelastrinaError>> + Send + 'a>> {
        Box::pin(std::future::ready(Ok(())))
    }

    fn load<'a>(
        &'a self,
        _context: &'a mut Context,
    ) -> Pin<Box<dyn Future<Output = Result<(), CelastrinaError>> + Send + 'a>> {
        Box::pin(std::future::ready(Ok(())))
    }

    fn process<'a>(
        &'a self,
        context: &'a mut Context,
    ) -> Pin<Box<dyn Future<Output = Result<(), CelastrinaError>> + Send + 'a>>;

    /// Health-probe branch taken instead of `process` when the context is
    /// marked as a monitor run.
    fn monitor<'a>(
        &'a self,
        context: &'a mut Context,
    ) -> Pin<Box<dyn Future<Output = Result<(), CelastrinaError>> + Send + 'a>> {
        context.log(
            crate::envelope::LogLevel::Info,
            "monitor run completed with no checks",
        );
        Box::pin(std::future::ready(Ok(())))
    }

    fn save<'a>(
        &'a self,
        _context: &'a mut Context,
    ) -> Pin<Box<dyn Future<Output = Result<(), CelastrinaError>> + Send + 'a>> {
        Box::pin(std::future::ready(Ok(())))
    }

    fn exception<'a>(
        &'a self,
        _context: &'a mut Context,
        _error: &'a CelastrinaError,
    ) -> Pin<Box<dyn Future<Output = Result<(), CelastrinaError>> + Send + 'a>> {
        Box::pin(std::future::ready(Ok(())))
    }

    fn terminate<'a>(
        &'a self,
        _context: &'a mut Context,
    ) -> Pin<Box<dyn Future<Output = Result<(), CelastrinaError>> + Send + 'a>> {
        Box::pin(std::future::ready(Ok(())))
    }
}

/// Drives the per-invocation state machine:
///
/// bootstrap → initialize → authenticate → authorize → validate → load →
/// (monitor | process) → save, with exception on any error and terminate
/// always. The envelope's completion sink is invoked exactly once whatever
/// stage fails; drop-marked errors complete silently.
pub struct LifecycleRunner;

impl LifecycleRunner {
    pub async fn run(
        configuration: Arc<Configuration>,
        function: &dyn Function,
        envelope: Arc<dyn Envelope>,
    ) {
        if let Err(err) = Self::bootstrap(&configuration, envelope.as_ref()).await {
            tracing::error!(
                configuration = configuration.name(),
                error = %err,
                "bootstrap failed"
            );
            Self::complete(envelope.as_ref(), Err(err), None);
            return;
        }

        let mut context = Context::new(configuration.clone(), envelope.clone());
        let outcome = Self::execute(&configuration, function, &mut context).await;
        let result = context.take_result();
        Self::complete(envelope.as_ref(), outcome, result);
    }

    async fn bootstrap(
        configuration: &Arc<Configuration>,
        envelope: &dyn Envelope,
    ) -> Result<(), CelastrinaError> {
        configuration.initialize(envelope).await?;
        configuration.bootstrapped(envelope).await
    }

    async fn execute(
        configuration: &Arc<Configuration>,
        function: &dyn Function,
        context: &mut Context,
    ) -> Result<(), CelastrinaError> {
        // The host deadline bounds the productive stages; exception and
        // terminate still run after it fires.
        let deadline = context.envelope().deadline();
        let outcome = match deadline {
            Some(deadline) => {
                match tokio::time::timeout_at(
                    deadline.into(),
                    Self::stages(configuration, function, context),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => Err(CelastrinaError::transient("invocation deadline exceeded")),
                }
            }
            None => Self::stages(configuration, function, context).await,
        };

        if let Err(err) = &outcome {
            tracing::warn!(
                request = context.request_id(),
                error = %err,
                "lifecycle diverted to exception"
            );
            if let Err(hook_err) = function.exception(context, err).await {
                tracing::warn!(error = %hook_err, "exception handler failed");
            }
            if let Err(hook_err) = Self::hooks(
                configuration,
                LifecycleState::Exception,
                context,
                Some(err),
            )
            .await
            {
                tracing::warn!(error = %hook_err, "exception add-on hook failed");
            }
        }

        // Terminate always runs; its failures are logged, not surfaced.
        if let Err(hook_err) = function.terminate(context).await {
            tracing::warn!(error = %hook_err, "terminate handler failed");
        }
        if let Err(hook_err) =
            Self::hooks(configuration, LifecycleState::Terminate, context, None).await
        {
            tracing::warn!(error = %hook_err, "terminate add-on hook failed");
        }

        outcome
    }

    async fn stages(
        configuration: &Arc<Configuration>,
        function: &dyn Function,
        context: &mut Context,
    ) -> Result<(), CelastrinaError> {
        function.initialize(context).await?;
        Self::hooks(configuration, LifecycleState::Initialize, context, None).await?;

        let subject = configuration.sentry()?.authenticate(context).await?;
        context.set_subject(subject);
        Self::hooks(configuration, LifecycleState::Authenticate, context, None).await?;

        configuration.sentry()?.authorize(context).await?;
        Self::hooks(configuration, LifecycleState::Authorize, context, None).await?;

        function.validate(context).await?;
        Self::hooks(configuration, LifecycleState::Validate, context, None).await?;

        function.load(context).await?;
        Self::hooks(configuration, LifecycleState::Load, context, None).await?;

        if context.monitor() {
            function.monitor(context).await?;
            Self::hooks(configuration, LifecycleState::Monitor, context, None).await?;
        } else {
            function.process(context).await?;
            Self::hooks(configuration, LifecycleState::Process, context, None).await?;
        }

        function.save(context).await?;
        Self::hooks(configuration, LifecycleState::Save, context, None).await?;
        Ok(())
    }

    async fn hooks(
        configuration: &Arc<Configuration>,
        state: LifecycleState,
        context: &mut Context,
        error: Option<&CelastrinaError>,
    ) -> Result<(), CelastrinaError> {
        configuration
            .add_ons()?
            .do_lifecycle(state, configuration.name(), context, error)
            .await
    }

    fn complete(
        envelope: &dyn Envelope,
        outcome: Result<(), CelastrinaError>,
        result: Option<serde_json::Value>,
    ) {
        match outcome {
            Ok(()) => match result {
                Some(value) => envelope.done(Completion::Result(value)),
                None => envelope.done(Completion::Empty),
            },
            Err(err) if err.is_drop() => {
                tracing::warn!(error = %err, "invocation completed silently on drop-marked error");
                envelope.done(Completion::Empty);
            }
            Err(err) => envelope.done(Completion::Error(err)),
        }
    }
}
