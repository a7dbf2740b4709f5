use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::config::QueuePolicy;
use crate::notify::JobOutcome;
use crate::protocol::{reply, Command, HeaderSet, ReplyVerdict};
use crate::registry::Request;
use crate::transport::PeerId;

use super::{CommandContext, Handler, HandlerResult};

/// The broker's command handler: registration, liveness, job admission and
/// dispatch, reply processing, and the tick sweep.
///
/// ## Rules
///
/// - Admission is checked in order: frozen, routing, pool existence, worker
///   availability.
/// - A request orphaned by a lost worker is charged one failure and
///   re-dispatched while its failure budget lasts; at the budget it gets a
///   single terminal outcome.
/// - Every request reaches exactly one terminal outcome.
#[derive(Debug, Default)]
pub struct BrokerHandler {
    frozen: bool,
    evaluated_jobs: u64,
    failed_jobs: u64,
}

impl BrokerHandler {
    /// A fresh, unfrozen handler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether job admission is currently frozen.
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Records a terminal outcome and updates counters.
    fn finish(&mut self, ctx: &mut CommandContext<'_>, outcome: JobOutcome) {
        self.evaluated_jobs += 1;
        if !outcome.is_success() {
            self.failed_jobs += 1;
        }
        ctx.outcome(outcome);
    }

    /// Assigns a request to a worker and queues the dispatch message.
    fn dispatch_to(
        &mut self,
        ctx: &mut CommandContext<'_>,
        worker: PeerId,
        request: Request,
    ) -> Result<(), Request> {
        let message = reply::dispatch(&request.id, &request.headers, &request.payload);
        let request_id = request.id.clone();
        ctx.registry.assign(&worker, request)?;
        debug!(request_id = %request_id, worker = %worker, "request dispatched");
        ctx.send(worker, message);
        Ok(())
    }

    /// If the worker is idle, hands it the oldest queued request for its pool.
    fn feed_worker(&mut self, ctx: &mut CommandContext<'_>, worker: &PeerId) {
        let pool = match ctx.registry.find(worker) {
            Some(w) if w.is_idle() => w.pool.clone(),
            _ => return,
        };
        if let Some(request) = ctx.registry.pop_pending(&pool) {
            if let Err(request) = self.dispatch_to(ctx, worker.clone(), request) {
                // Should not happen for an idle worker, but never lose the
                // request.
                let _ = ctx.registry.enqueue(pool, request, usize::MAX);
            }
        }
    }

    /// Charges a failed assignment and re-dispatches the request, or ends it
    /// with a terminal outcome once the failure budget is spent.
    fn requeue_or_fail(
        &mut self,
        ctx: &mut CommandContext<'_>,
        mut request: Request,
        detail: String,
        worker_lost: bool,
    ) {
        request.failure_count += 1;

        let terminal = |request: &Request, detail: String| {
            if worker_lost {
                JobOutcome::worker_lost(request.id.clone(), detail, request.submitted_at)
            } else {
                JobOutcome::failed(request.id.clone(), detail, request.submitted_at)
            }
        };

        if request.failure_count >= ctx.config.max_request_failures {
            warn!(
                request_id = %request.id,
                failures = request.failure_count,
                "failure budget exhausted"
            );
            let outcome = terminal(&request, detail);
            self.finish(ctx, outcome);
            return;
        }

        let pool = match ctx.config.routing.route(&request.headers) {
            Some((pool, _)) => pool.to_string(),
            None => {
                let outcome = terminal(&request, format!("{detail}; no routing rule matches"));
                self.finish(ctx, outcome);
                return;
            }
        };

        debug!(request_id = %request.id, pool = %pool, reason = %detail, "re-dispatching request");
        if let Some(worker) = ctx.registry.select_idle(&pool) {
            match self.dispatch_to(ctx, worker, request) {
                Ok(()) => return,
                // Fall through to the queue on an assignment race.
                Err(returned) => request = returned,
            }
        }

        let capacity = ctx.config.queue_capacity();
        if let Err(request) = ctx.registry.enqueue(pool, request, capacity) {
            let outcome = terminal(&request, format!("{detail}; queue full"));
            self.finish(ctx, outcome);
        }
    }

    fn on_register(
        &mut self,
        ctx: &mut CommandContext<'_>,
        pool: &str,
        headers: &HeaderSet,
    ) -> HandlerResult {
        let origin = ctx.origin.clone();
        let description = headers.get("description").unwrap_or("").to_string();
        let (outcome, orphaned) =
            ctx.registry
                .register(&origin, pool, headers.clone(), description, ctx.now);
        info!(worker = %origin, pool = %pool, outcome = ?outcome, "worker registered");

        if let Some(request) = orphaned {
            self.requeue_or_fail(ctx, request, format!("worker {origin} re-registered"), true);
        }
        self.feed_worker(ctx, &origin);
        HandlerResult::Reply(reply::ack())
    }

    fn on_heartbeat(&mut self, ctx: &mut CommandContext<'_>) -> HandlerResult {
        let origin = ctx.origin.clone();
        if ctx.registry.heartbeat(&origin, ctx.now) {
            HandlerResult::Reply(reply::pong())
        } else {
            // Unknown peer, e.g. after a broker restart: ask it to register.
            debug!(worker = %origin, "heartbeat from unknown worker");
            HandlerResult::Reply(reply::intro())
        }
    }

    fn on_unregister(&mut self, ctx: &mut CommandContext<'_>) -> HandlerResult {
        let origin = ctx.origin.clone();
        match ctx.registry.unregister(&origin) {
            Some((worker, orphaned)) => {
                info!(worker = %worker.id, pool = %worker.pool, "worker unregistered");
                if let Some(request) = orphaned {
                    self.requeue_or_fail(
                        ctx,
                        request,
                        format!("worker {origin} unregistered"),
                        true,
                    );
                }
                HandlerResult::Reply(reply::ack())
            }
            None => {
                warn!(peer = %origin, "unregister from unknown worker");
                HandlerResult::NoReply
            }
        }
    }

    fn on_reply(
        &mut self,
        ctx: &mut CommandContext<'_>,
        request_id: &str,
        verdict: &ReplyVerdict,
    ) -> HandlerResult {
        let origin = ctx.origin.clone();
        match ctx.registry.in_flight_of(&origin).map(|r| r.id == request_id) {
            None => {
                warn!(peer = %origin, request_id, "reply from a worker with nothing in flight");
                return HandlerResult::NoReply;
            }
            Some(false) => {
                warn!(peer = %origin, request_id, "reply does not match the in-flight request");
                return HandlerResult::NoReply;
            }
            Some(true) => {}
        }

        let Some(request) = ctx.registry.complete(&origin) else {
            return HandlerResult::NoReply;
        };

        match verdict {
            ReplyVerdict::Done => {
                let outcome = JobOutcome::done(request.id.clone(), request.submitted_at);
                self.finish(ctx, outcome);
            }
            ReplyVerdict::Failed { reason } => {
                let outcome =
                    JobOutcome::failed(request.id.clone(), reason.clone(), request.submitted_at);
                self.finish(ctx, outcome);
            }
            ReplyVerdict::InternalError { reason } => {
                // The worker faulted, not the request; try it elsewhere.
                self.requeue_or_fail(ctx, request, reason.clone(), false);
            }
        }

        self.feed_worker(ctx, &origin);
        HandlerResult::NoReply
    }

    fn on_job(
        &mut self,
        ctx: &mut CommandContext<'_>,
        request_id: &str,
        headers: &HeaderSet,
        payload: &[Bytes],
    ) -> HandlerResult {
        if self.frozen {
            return HandlerResult::Reply(reply::reject(request_id, "broker is frozen"));
        }

        let (pool, rule) = match ctx.config.routing.route(headers) {
            Some((pool, rule)) => (pool.to_string(), rule.map(str::to_string)),
            None => {
                debug!(request_id, "no routing rule matches");
                return HandlerResult::Reply(reply::reject(
                    request_id,
                    "no routing rule matches request headers",
                ));
            }
        };
        debug!(request_id, pool = %pool, rule = rule.as_deref().unwrap_or("<default>"), "request routed");

        if !ctx.registry.pool_exists(&pool) {
            return HandlerResult::Reply(reply::reject(
                request_id,
                &format!("no worker registered for pool '{pool}'"),
            ));
        }

        let request = Request::new(request_id, headers.clone(), payload.to_vec());

        if let Some(worker) = ctx.registry.select_idle(&pool) {
            return match self.dispatch_to(ctx, worker, request) {
                Ok(()) => HandlerResult::Reply(reply::accept(request_id)),
                // A request with this id is already live.
                Err(_) => HandlerResult::Reply(reply::reject(request_id, "duplicate request id")),
            };
        }

        match ctx.config.queue_policy {
            QueuePolicy::Queue { capacity } => {
                match ctx.registry.enqueue(pool, request, capacity) {
                    Ok(()) => HandlerResult::Reply(reply::accept(request_id)),
                    Err(_) => HandlerResult::Reply(reply::reject(request_id, "queue is full")),
                }
            }
            QueuePolicy::Reject => {
                HandlerResult::Reply(reply::reject(request_id, "no idle worker available"))
            }
        }
    }

    fn on_stats(&mut self, ctx: &mut CommandContext<'_>) -> HandlerResult {
        let pairs = [
            ("queued-jobs", ctx.registry.pending_len().to_string()),
            ("evaluated-jobs", self.evaluated_jobs.to_string()),
            ("failed-jobs", self.failed_jobs.to_string()),
            ("worker-count", ctx.registry.len().to_string()),
            ("idle-worker-count", ctx.registry.idle_count().to_string()),
            ("jobs-in-progress", ctx.registry.in_flight_len().to_string()),
            ("is-frozen", self.frozen.to_string()),
        ];
        HandlerResult::Reply(reply::stats(pairs))
    }

    fn on_tick(&mut self, ctx: &mut CommandContext<'_>) -> HandlerResult {
        let expired = ctx.registry.sweep(ctx.now, ctx.config.expiry_timeout);
        for entry in expired {
            warn!(
                worker = %entry.worker.id,
                pool = %entry.worker.pool,
                "worker expired"
            );
            if let Some(request) = entry.orphaned {
                self.requeue_or_fail(
                    ctx,
                    request,
                    format!("worker {} expired", entry.worker.id),
                    true,
                );
            }
        }
        HandlerResult::NoReply
    }
}

impl Handler for BrokerHandler {
    fn name(&self) -> &str {
        "broker"
    }

    fn handle(&mut self, command: &Command, ctx: &mut CommandContext<'_>) -> HandlerResult {
        match command {
            Command::Register { pool, headers } => self.on_register(ctx, pool, headers),
            Command::Heartbeat => self.on_heartbeat(ctx),
            Command::Unregister => self.on_unregister(ctx),
            Command::Reply {
                request_id,
                verdict,
            } => self.on_reply(ctx, request_id, verdict),
            Command::Job {
                request_id,
                headers,
                payload,
            } => self.on_job(ctx, request_id, headers, payload),
            Command::Stats => self.on_stats(ctx),
            Command::Freeze => {
                info!("job admission frozen");
                self.frozen = true;
                HandlerResult::Reply(reply::ack())
            }
            Command::Unfreeze => {
                info!("job admission unfrozen");
                self.frozen = false;
                HandlerResult::Reply(reply::ack())
            }
            Command::Tick => self.on_tick(ctx),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use bytes::Bytes;

    use crate::config::BrokerConfig;
    use crate::matching::{HeaderMatcher, RoutingRule, RoutingTable};
    use crate::notify::OutcomeStatus;
    use crate::protocol::{HeaderSet, Message};
    use crate::registry::WorkerRegistry;

    use super::*;

    struct Harness {
        handler: BrokerHandler,
        registry: WorkerRegistry,
        config: BrokerConfig,
        outbox: Vec<(PeerId, Message)>,
        outcomes: Vec<JobOutcome>,
        now: Instant,
    }

    impl Harness {
        fn new() -> Self {
            let config = BrokerConfig {
                routing: RoutingTable::new(Vec::new(), Some("default".into())),
                ..BrokerConfig::default()
            };
            Self {
                handler: BrokerHandler::new(),
                registry: WorkerRegistry::new(),
                config,
                outbox: Vec::new(),
                outcomes: Vec::new(),
                now: Instant::now(),
            }
        }

        fn handle(&mut self, origin: &str, command: Command) -> HandlerResult {
            let mut ctx = CommandContext::new(
                PeerId::from(origin),
                &mut self.registry,
                &self.config,
                self.now,
                &mut self.outbox,
                &mut self.outcomes,
            );
            self.handler.handle(&command, &mut ctx)
        }

        fn register(&mut self, worker: &str) {
            let result = self.handle(
                worker,
                Command::Register {
                    pool: "default".into(),
                    headers: HeaderSet::new(),
                },
            );
            assert!(matches!(result, HandlerResult::Reply(_)));
        }

        fn job(&mut self, client: &str, id: &str) -> HandlerResult {
            self.handle(
                client,
                Command::Job {
                    request_id: id.into(),
                    headers: HeaderSet::new(),
                    payload: vec![Bytes::from_static(b"work")],
                },
            )
        }
    }

    fn reply_tag(result: &HandlerResult) -> &str {
        match result {
            HandlerResult::Reply(message) => message.text_frame(0).unwrap(),
            other => panic!("expected a reply, got {other:?}"),
        }
    }

    #[test]
    fn job_is_dispatched_to_an_idle_worker() {
        let mut h = Harness::new();
        h.register("w1");

        let result = h.job("c1", "r1");
        assert_eq!(reply_tag(&result), "accept");

        assert_eq!(h.outbox.len(), 1);
        let (target, message) = &h.outbox[0];
        assert_eq!(target, &PeerId::from("w1"));
        assert_eq!(message.text_frame(0), Some("dispatch"));
        assert_eq!(message.text_frame(1), Some("r1"));
        assert_eq!(h.registry.in_flight_len(), 1);
    }

    #[test]
    fn job_queues_when_all_workers_are_busy() {
        let mut h = Harness::new();
        h.register("w1");
        assert_eq!(reply_tag(&h.job("c1", "r1")), "accept");

        let queued = h.job("c1", "r2");
        assert_eq!(reply_tag(&queued), "accept");
        assert_eq!(h.registry.pending_len(), 1);

        // Worker finishes r1 and immediately gets r2.
        h.handle(
            "w1",
            Command::Reply {
                request_id: "r1".into(),
                verdict: ReplyVerdict::Done,
            },
        );
        assert_eq!(h.registry.pending_len(), 0);
        assert_eq!(h.outbox.len(), 2);
        assert_eq!(h.outbox[1].1.text_frame(1), Some("r2"));
        assert_eq!(h.outcomes.len(), 1);
        assert_eq!(h.outcomes[0].status, OutcomeStatus::Done);
    }

    #[test]
    fn job_with_no_matching_pool_is_rejected() {
        let mut h = Harness::new();
        let result = h.job("c1", "r1");
        assert_eq!(reply_tag(&result), "reject");
    }

    #[test]
    fn job_with_no_route_is_rejected() {
        let mut h = Harness::new();
        h.config.routing = RoutingTable::new(
            vec![RoutingRule::new(
                "gpu-only",
                HeaderMatcher::any_of("env", ["gpu"]),
                "gpu",
            )],
            None,
        );
        h.register("w1");

        let result = h.job("c1", "r1");
        assert_eq!(reply_tag(&result), "reject");
    }

    #[test]
    fn frozen_broker_rejects_jobs_until_unfrozen() {
        let mut h = Harness::new();
        h.register("w1");

        assert_eq!(reply_tag(&h.handle("c1", Command::Freeze)), "ack");
        assert!(h.handler.is_frozen());
        assert_eq!(reply_tag(&h.job("c1", "r1")), "reject");

        assert_eq!(reply_tag(&h.handle("c1", Command::Unfreeze)), "ack");
        assert_eq!(reply_tag(&h.job("c1", "r1")), "accept");
    }

    #[test]
    fn failed_reply_yields_a_failed_outcome() {
        let mut h = Harness::new();
        h.register("w1");
        h.job("c1", "r1");

        h.handle(
            "w1",
            Command::Reply {
                request_id: "r1".into(),
                verdict: ReplyVerdict::Failed {
                    reason: "bad input".into(),
                },
            },
        );
        assert_eq!(h.outcomes.len(), 1);
        assert_eq!(h.outcomes[0].status, OutcomeStatus::Failed);
        assert_eq!(h.outcomes[0].detail, "bad input");
        assert!(h.registry.find(&PeerId::from("w1")).unwrap().is_idle());
    }

    #[test]
    fn internal_error_re_dispatches_to_another_worker() {
        let mut h = Harness::new();
        h.register("w1");
        h.register("w2");
        h.job("c1", "r1");
        assert_eq!(h.outbox[0].0, PeerId::from("w1"));

        h.handle(
            "w1",
            Command::Reply {
                request_id: "r1".into(),
                verdict: ReplyVerdict::InternalError {
                    reason: "sandbox crashed".into(),
                },
            },
        );

        // No terminal outcome; the request moved to w2.
        assert!(h.outcomes.is_empty());
        assert_eq!(h.outbox.len(), 2);
        assert_eq!(h.outbox[1].0, PeerId::from("w2"));
        assert_eq!(h.registry.in_flight_len(), 1);
    }

    #[test]
    fn mismatched_reply_is_ignored() {
        let mut h = Harness::new();
        h.register("w1");
        h.job("c1", "r1");

        h.handle(
            "w1",
            Command::Reply {
                request_id: "r999".into(),
                verdict: ReplyVerdict::Done,
            },
        );
        assert!(h.outcomes.is_empty());
        assert_eq!(h.registry.in_flight_len(), 1);

        h.handle(
            "w2",
            Command::Reply {
                request_id: "r1".into(),
                verdict: ReplyVerdict::Done,
            },
        );
        assert!(h.outcomes.is_empty());
    }

    #[test]
    fn expired_worker_orphan_is_re_dispatched_while_budget_lasts() {
        let mut h = Harness::new();
        h.register("w1");
        h.register("w2");
        h.job("c1", "r1");

        // w1 misses heartbeats; w2 stays fresh.
        h.now += Duration::from_secs(5);
        h.handle(
            "w2",
            Command::Heartbeat,
        );
        let result = h.handle("any", Command::Tick);
        assert!(matches!(result, HandlerResult::NoReply));

        assert_eq!(h.registry.len(), 1);
        assert!(h.outcomes.is_empty());
        assert_eq!(h.outbox.last().unwrap().0, PeerId::from("w2"));
        assert_eq!(h.registry.in_flight_of(&PeerId::from("w2")).unwrap().id, "r1");
        assert_eq!(h.registry.in_flight_of(&PeerId::from("w2")).unwrap().failure_count, 1);
    }

    #[test]
    fn exhausted_failure_budget_yields_one_worker_lost_outcome() {
        let mut h = Harness::new();
        h.config.max_request_failures = 1;
        h.register("w1");
        h.job("c1", "r1");

        h.now += Duration::from_secs(5);
        h.handle("any", Command::Tick);

        assert_eq!(h.outcomes.len(), 1);
        assert_eq!(h.outcomes[0].status, OutcomeStatus::WorkerLost);
        assert_eq!(h.outcomes[0].request_id, "r1");
        assert_eq!(h.registry.in_flight_len(), 0);
    }

    #[test]
    fn heartbeat_answers_pong_for_known_and_intro_for_unknown() {
        let mut h = Harness::new();
        h.register("w1");
        assert_eq!(reply_tag(&h.handle("w1", Command::Heartbeat)), "pong");
        assert_eq!(reply_tag(&h.handle("w9", Command::Heartbeat)), "intro");
    }

    #[test]
    fn unregister_orphan_moves_to_remaining_worker() {
        let mut h = Harness::new();
        h.register("w1");
        h.register("w2");
        h.job("c1", "r1");

        assert_eq!(reply_tag(&h.handle("w1", Command::Unregister)), "ack");
        assert_eq!(h.registry.len(), 1);
        assert_eq!(h.registry.in_flight_of(&PeerId::from("w2")).unwrap().id, "r1");
    }

    #[test]
    fn stats_reports_broker_counters() {
        let mut h = Harness::new();
        h.register("w1");
        h.job("c1", "r1");
        h.job("c1", "r2");
        h.handle(
            "w1",
            Command::Reply {
                request_id: "r1".into(),
                verdict: ReplyVerdict::Done,
            },
        );

        let result = h.handle("c1", Command::Stats);
        let HandlerResult::Reply(message) = result else {
            panic!("expected stats reply");
        };
        let mut pairs = std::collections::HashMap::new();
        let mut index = 1;
        while index + 1 < message.len() {
            let key = message.text_frame(index).unwrap().to_string();
            let value = message.text_frame(index + 1).unwrap().to_string();
            pairs.insert(key, value);
            index += 2;
        }
        assert_eq!(pairs["worker-count"], "1");
        assert_eq!(pairs["evaluated-jobs"], "1");
        assert_eq!(pairs["failed-jobs"], "0");
        assert_eq!(pairs["jobs-in-progress"], "1");
        assert_eq!(pairs["queued-jobs"], "0");
        assert_eq!(pairs["is-frozen"], "false");
    }
}
