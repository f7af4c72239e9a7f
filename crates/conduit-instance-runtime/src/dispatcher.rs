//! Lifecycle dispatcher: validate, audit, invoke the engine, enrich the result.
//!
//! Every public operation is a boundary. Whatever fails inside (colo or type
//! checks, window validation, audit, the engine call) is logged and returned
//! as a [`BadRequest`] carrying the original message. The dispatcher never
//! retries.
//!
//! Mutating operations write their audit record right after the colo and type
//! checks, before parameter validation, so rejected requests still leave a
//! trail.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;

use conduit_entity::{Entity, EntityRegistry, EntityType};

use super::audit::{AuditAction, AuditRecord, AuditSink};
use super::engine::ExecutionEngine;
use super::error::{BadRequest, InstanceError};
use super::log_resolver::{LogCategory, LogResolver};
use super::models::{Instance, InstancesResult};
use super::properties::parse_properties;
use super::window::{not_empty, parse_entity_type, WindowResolver};

/// Run id used for log links when a status request does not name one.
pub const DEFAULT_RUN_ID: &str = "0";

/// Caller identity attached to audit records.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequestContext {
    pub request_id: String,
    pub requester: Option<String>,
    pub remote_addr: Option<String>,
}

impl RequestContext {
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            ..Self::default()
        }
    }

    pub fn with_requester(mut self, requester: impl Into<String>) -> Self {
        self.requester = Some(requester.into());
        self
    }

    pub fn with_remote_addr(mut self, remote_addr: impl Into<String>) -> Self {
        self.remote_addr = Some(remote_addr.into());
        self
    }
}

/// Transport-agnostic instance request.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InstanceRequest {
    pub entity_type: String,
    pub entity_name: String,
    pub colo: String,
    pub start: Option<String>,
    pub end: Option<String>,
    pub run_id: Option<String>,
    /// Raw `key=value` payload for mutating operations.
    pub payload: Option<String>,
}

impl InstanceRequest {
    pub fn new(
        entity_type: impl Into<String>,
        entity_name: impl Into<String>,
        colo: impl Into<String>,
    ) -> Self {
        Self {
            entity_type: entity_type.into(),
            entity_name: entity_name.into(),
            colo: colo.into(),
            ..Self::default()
        }
    }

    pub fn with_start(mut self, start: impl Into<String>) -> Self {
        self.start = Some(start.into());
        self
    }

    pub fn with_end(mut self, end: impl Into<String>) -> Self {
        self.end = Some(end.into());
        self
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = Some(payload.into());
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleAction {
    Kill,
    Suspend,
    Resume,
    Rerun,
}

impl LifecycleAction {
    pub fn audit_action(&self) -> AuditAction {
        match self {
            LifecycleAction::Kill => AuditAction::InstanceKill,
            LifecycleAction::Suspend => AuditAction::InstanceSuspend,
            LifecycleAction::Resume => AuditAction::InstanceResume,
            LifecycleAction::Rerun => AuditAction::InstanceRerun,
        }
    }

    fn failure_context(&self) -> &'static str {
        match self {
            LifecycleAction::Kill => "kill instances",
            LifecycleAction::Suspend => "suspend instances",
            LifecycleAction::Resume => "resume instances",
            LifecycleAction::Rerun => "rerun instances",
        }
    }
}

pub struct LifecycleDispatcher<E: ExecutionEngine> {
    engine: Arc<E>,
    registry: Arc<dyn EntityRegistry>,
    log_resolver: Arc<dyn LogResolver>,
    audit: Arc<dyn AuditSink>,
    colos: HashSet<String>,
}

impl<E: ExecutionEngine> LifecycleDispatcher<E> {
    pub fn new<I, S>(
        engine: Arc<E>,
        registry: Arc<dyn EntityRegistry>,
        log_resolver: Arc<dyn LogResolver>,
        audit: Arc<dyn AuditSink>,
        colos: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            engine,
            registry,
            log_resolver,
            audit,
            colos: colos.into_iter().map(Into::into).collect(),
        }
    }

    pub fn engine(&self) -> &Arc<E> {
        &self.engine
    }

    pub fn running_instances(&self, req: &InstanceRequest) -> Result<InstancesResult, BadRequest> {
        self.boundary("get running instances", || {
            self.check_colo(&req.colo)?;
            let entity_type = check_type(&req.entity_type)?;
            not_empty("entityName", &req.entity_name)?;
            let entity = self.registry.resolve(entity_type, &req.entity_name)?;
            Ok(self.engine.running_instances(&entity)?)
        })
    }

    /// Instance status with a log URL resolved for every returned instance.
    pub fn status(&self, req: &InstanceRequest) -> Result<InstancesResult, BadRequest> {
        self.boundary("get instances status", || {
            self.check_colo(&req.colo)?;
            check_type(&req.entity_type)?;
            let range = WindowResolver::new(self.registry.as_ref()).validate_params(
                &req.entity_type,
                &req.entity_name,
                req.start.as_deref().unwrap_or_default(),
                req.end.as_deref(),
            )?;
            let result = self.engine.status(&range.entity, range.start, range.end)?;
            let run_id = req
                .run_id
                .as_deref()
                .filter(|r| !r.trim().is_empty())
                .unwrap_or(DEFAULT_RUN_ID);
            Ok(self.with_log_urls(&range.entity, LogCategory::Default, run_id, result))
        })
    }

    pub fn kill(
        &self,
        ctx: &RequestContext,
        req: &InstanceRequest,
    ) -> Result<InstancesResult, BadRequest> {
        self.apply(LifecycleAction::Kill, ctx, req)
    }

    pub fn suspend(
        &self,
        ctx: &RequestContext,
        req: &InstanceRequest,
    ) -> Result<InstancesResult, BadRequest> {
        self.apply(LifecycleAction::Suspend, ctx, req)
    }

    pub fn resume(
        &self,
        ctx: &RequestContext,
        req: &InstanceRequest,
    ) -> Result<InstancesResult, BadRequest> {
        self.apply(LifecycleAction::Resume, ctx, req)
    }

    pub fn rerun(
        &self,
        ctx: &RequestContext,
        req: &InstanceRequest,
    ) -> Result<InstancesResult, BadRequest> {
        self.apply(LifecycleAction::Rerun, ctx, req)
    }

    pub fn apply(
        &self,
        action: LifecycleAction,
        ctx: &RequestContext,
        req: &InstanceRequest,
    ) -> Result<InstancesResult, BadRequest> {
        self.boundary(action.failure_context(), || {
            self.check_colo(&req.colo)?;
            check_type(&req.entity_type)?;
            self.audit.record(&AuditRecord {
                action: action.audit_action(),
                entity_type: req.entity_type.clone(),
                entity_name: req.entity_name.clone(),
                request_id: ctx.request_id.clone(),
                requester: ctx.requester.clone(),
                remote_addr: ctx.remote_addr.clone(),
                recorded_at: Utc::now(),
            })?;

            let range = WindowResolver::new(self.registry.as_ref()).validate_params(
                &req.entity_type,
                &req.entity_name,
                req.start.as_deref().unwrap_or_default(),
                req.end.as_deref(),
            )?;
            let props = parse_properties(req.payload.as_deref());
            log::info!(
                "{} request_id={} entity={} cluster={} start={} end={} props={}",
                action.audit_action(),
                ctx.request_id,
                range.entity.name,
                range.cluster,
                range.start.to_rfc3339(),
                range.end.to_rfc3339(),
                props.len()
            );

            let (entity, start, end) = (&range.entity, range.start, range.end);
            let result = match action {
                LifecycleAction::Kill => self.engine.kill(entity, start, end, &props),
                LifecycleAction::Suspend => self.engine.suspend(entity, start, end, &props),
                LifecycleAction::Resume => self.engine.resume(entity, start, end, &props),
                LifecycleAction::Rerun => self.engine.rerun(entity, start, end, &props),
            }?;
            Ok(result)
        })
    }

    fn check_colo(&self, colo: &str) -> Result<(), InstanceError> {
        not_empty("colo", colo)?;
        if !self.colos.contains(colo.trim()) {
            return Err(InstanceError::UnknownColo(colo.to_string()));
        }
        Ok(())
    }

    /// Resolves each instance's log URL independently. A failed lookup leaves
    /// that instance without a URL; it never drops the instance or fails the
    /// batch.
    fn with_log_urls(
        &self,
        entity: &Entity,
        category: LogCategory,
        run_id: &str,
        result: InstancesResult,
    ) -> InstancesResult {
        let instances = result
            .instances
            .into_iter()
            .map(|instance| {
                match self
                    .log_resolver
                    .resolve_log_url(entity, &instance, category, run_id)
                {
                    Ok(resolved) => resolved,
                    Err(err) => {
                        log::warn!(
                            "log url unresolved entity={} cluster={} nominal_time={}: {}",
                            entity.name,
                            instance.cluster,
                            instance.nominal_time.to_rfc3339(),
                            err
                        );
                        Instance {
                            log_url: None,
                            ..instance
                        }
                    }
                }
            })
            .collect();
        InstancesResult::new(result.message, instances)
    }

    fn boundary<T>(
        &self,
        context: &str,
        op: impl FnOnce() -> Result<T, InstanceError>,
    ) -> Result<T, BadRequest> {
        op().map_err(|err| {
            log::error!("Failed to {}: {}", context, err);
            BadRequest::from(err)
        })
    }
}

fn check_type(entity_type: &str) -> Result<EntityType, InstanceError> {
    not_empty("entityType", entity_type)?;
    let parsed = parse_entity_type(entity_type)?;
    if !parsed.is_schedulable() {
        return Err(InstanceError::InvalidEntityType(
            "Instance management functions don't apply to Cluster entities".to_string(),
        ));
    }
    Ok(parsed)
}
