//! FanoutScheduler - turns one new post into per-recipient deliveries.
//!
//! For every post the scheduler:
//! 1. Resolves the author's connections
//! 2. Drops the author, invalid identities and duplicates
//! 3. Caps the audience at `max_audience_per_post` by random sampling
//! 4. Classifies each recipient's priority
//! 5. Publishes one durable task and one live event per recipient
//!
//! Only step 1 can fail the operation. Steps 1-3 form a [`FanoutPlan`];
//! steps 4-5 can run detached from the caller through
//! [`FanoutScheduler::spawn_delivery`]. Publish failures are logged per
//! recipient and counted in the [`FanoutReport`].

use std::collections::HashSet;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::domain::feed::{FeedEvent, FeedUpdateTask, PostCreatedEvent};
use crate::domain::foundation::{DomainError, UserId};
use crate::ports::{AudienceResolver, LiveEventChannel, TaskQueue};

use super::policy::{AudienceSampler, PriorityClassifier, RandomPriorityClassifier, RandomSampler};

/// Audience cap applied per post.
pub const DEFAULT_MAX_AUDIENCE_PER_POST: usize = 100;

/// Recipients published concurrently.
const PUBLISH_CONCURRENCY: usize = 16;

/// Outcome of fanning out one post.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FanoutReport {
    /// Connections returned by the resolver.
    pub audience: usize,
    /// Author, empty ids and duplicates removed before sampling.
    pub skipped: usize,
    /// Recipients chosen after the cap.
    pub selected: usize,
    pub tasks_published: usize,
    pub tasks_failed: usize,
    pub live_published: usize,
    pub live_failed: usize,
}

impl FanoutReport {
    pub fn is_complete(&self) -> bool {
        self.tasks_failed == 0 && self.live_failed == 0
    }
}

/// Recipients chosen for one post, ready to be published.
#[derive(Debug, Clone)]
pub struct FanoutPlan {
    event: FeedEvent,
    recipients: Vec<UserId>,
    report: FanoutReport,
}

impl FanoutPlan {
    pub fn recipients(&self) -> &[UserId] {
        &self.recipients
    }

    pub fn is_empty(&self) -> bool {
        self.recipients.is_empty()
    }

    /// Counts known before delivery: audience, skipped and selected.
    pub fn report(&self) -> &FanoutReport {
        &self.report
    }
}

#[derive(Debug, Clone, Copy)]
struct RecipientOutcome {
    task: bool,
    live: bool,
}

pub struct FanoutScheduler {
    audience: Arc<dyn AudienceResolver>,
    tasks: Arc<dyn TaskQueue>,
    live: Arc<dyn LiveEventChannel>,
    sampler: Arc<dyn AudienceSampler>,
    classifier: Arc<dyn PriorityClassifier>,
    max_audience_per_post: usize,
    deliveries: TaskTracker,
}

impl FanoutScheduler {
    /// Scheduler with the default cap and random policies.
    pub fn new(
        audience: Arc<dyn AudienceResolver>,
        tasks: Arc<dyn TaskQueue>,
        live: Arc<dyn LiveEventChannel>,
    ) -> Self {
        Self {
            audience,
            tasks,
            live,
            sampler: Arc::new(RandomSampler::new()),
            classifier: Arc::new(RandomPriorityClassifier::new()),
            max_audience_per_post: DEFAULT_MAX_AUDIENCE_PER_POST,
            deliveries: TaskTracker::new(),
        }
    }

    pub fn with_sampler(mut self, sampler: Arc<dyn AudienceSampler>) -> Self {
        self.sampler = sampler;
        self
    }

    pub fn with_classifier(mut self, classifier: Arc<dyn PriorityClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_max_audience(mut self, cap: usize) -> Self {
        self.max_audience_per_post = cap;
        self
    }

    pub fn max_audience_per_post(&self) -> usize {
        self.max_audience_per_post
    }

    /// Fans `post` out to the author's audience and waits for every publish.
    ///
    /// # Errors
    ///
    /// Returns the resolver's error when the audience cannot be loaded. No
    /// task is published in that case.
    pub async fn schedule(&self, post: &PostCreatedEvent) -> Result<FanoutReport, DomainError> {
        let plan = self.plan(post).await?;
        Ok(self.deliver(plan).await)
    }

    /// Resolves, filters and samples the audience without publishing anything.
    ///
    /// # Errors
    ///
    /// Returns the resolver's error when the audience cannot be loaded.
    pub async fn plan(&self, post: &PostCreatedEvent) -> Result<FanoutPlan, DomainError> {
        let connections = self.audience.connections_of(&post.author_id).await.map_err(|e| {
            warn!(
                post_id = %post.post_id,
                author_id = %post.author_id,
                error = %e,
                "Audience resolution failed, fan-out aborted"
            );
            e
        })?;

        let mut report = FanoutReport {
            audience: connections.len(),
            ..FanoutReport::default()
        };

        let eligible = eligible_recipients(&post.author_id, connections);
        report.skipped = report.audience - eligible.len();

        let recipients = self.sampler.sample(eligible, self.max_audience_per_post);
        report.selected = recipients.len();

        Ok(FanoutPlan {
            event: FeedEvent::from(post),
            recipients,
            report,
        })
    }

    /// Publishes one task and one live event per planned recipient.
    pub async fn deliver(&self, plan: FanoutPlan) -> FanoutReport {
        let FanoutPlan {
            event,
            recipients,
            mut report,
        } = plan;

        if recipients.is_empty() {
            debug!(post_id = %event.post_id, author_id = %event.author_id, "No recipients for post");
            return report;
        }

        let outcomes: Vec<RecipientOutcome> = stream::iter(recipients)
            .map(|recipient| self.deliver_to(recipient, &event))
            .buffer_unordered(PUBLISH_CONCURRENCY)
            .collect()
            .await;

        for outcome in outcomes {
            if outcome.task {
                report.tasks_published += 1;
            } else {
                report.tasks_failed += 1;
            }
            if outcome.live {
                report.live_published += 1;
            } else {
                report.live_failed += 1;
            }
        }

        info!(
            post_id = %event.post_id,
            author_id = %event.author_id,
            audience = report.audience,
            selected = report.selected,
            tasks_published = report.tasks_published,
            tasks_failed = report.tasks_failed,
            live_failed = report.live_failed,
            "Post fanned out"
        );

        report
    }

    /// Runs [`deliver`](Self::deliver) on a tracked background task.
    ///
    /// Returns immediately. [`drain`](Self::drain) waits for every delivery
    /// started this way.
    pub fn spawn_delivery(self: &Arc<Self>, plan: FanoutPlan) {
        let scheduler = Arc::clone(self);
        self.deliveries.spawn(async move {
            scheduler.deliver(plan).await;
        });
    }

    /// Background deliveries still publishing.
    pub fn deliveries_in_flight(&self) -> usize {
        self.deliveries.len()
    }

    /// Waits until every spawned delivery has finished.
    pub async fn drain(&self) {
        self.deliveries.close();
        self.deliveries.wait().await;
        self.deliveries.reopen();
    }

    async fn deliver_to(&self, recipient: UserId, event: &FeedEvent) -> RecipientOutcome {
        let priority = self.classifier.classify(&event.author_id, &recipient);
        let task = FeedUpdateTask::new(recipient.clone(), event.clone(), priority);

        let task_ok = match self.tasks.publish_task(&task).await {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    recipient_id = %recipient,
                    post_id = %event.post_id,
                    error = %e,
                    "Failed to publish feed update task"
                );
                false
            }
        };

        let live_ok = match self.live.publish_live(&recipient, event).await {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    recipient_id = %recipient,
                    post_id = %event.post_id,
                    error = %e,
                    "Failed to publish live feed event"
                );
                false
            }
        };

        RecipientOutcome {
            task: task_ok,
            live: live_ok,
        }
    }
}

/// Valid, distinct connections other than the author, in resolver order.
fn eligible_recipients(author: &UserId, connections: Vec<String>) -> Vec<UserId> {
    let mut seen = HashSet::new();
    connections
        .into_iter()
        .filter_map(|raw| match UserId::new(raw.trim()) {
            Ok(id) => Some(id),
            Err(_) => {
                warn!(author_id = %author, "Skipping invalid recipient identity");
                None
            }
        })
        .filter(|id| id != author)
        .filter(|id| seen.insert(id.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::broker::InMemoryBroker;
    use crate::adapters::memory::InMemoryAudienceResolver;
    use crate::domain::feed::{FeedEventType, Priority};
    use crate::domain::foundation::{ErrorCode, PostId};
    use crate::ports::{BrokerError, LiveConsumer, TaskConsumer};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::super::policy::{FixedPriorityClassifier, TruncatingSampler};

    fn post(author: &str) -> PostCreatedEvent {
        PostCreatedEvent::new(
            PostId::new("post-1").unwrap(),
            UserId::new(author).unwrap(),
            "hello",
        )
    }

    fn friends(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("friend-{}", i)).collect()
    }

    fn scheduler(resolver: InMemoryAudienceResolver, broker: &InMemoryBroker) -> FanoutScheduler {
        FanoutScheduler::new(
            Arc::new(resolver),
            Arc::new(broker.clone()),
            Arc::new(broker.clone()),
        )
        .with_sampler(Arc::new(RandomSampler::seeded(11)))
        .with_classifier(Arc::new(FixedPriorityClassifier(Priority::MEDIUM)))
    }

    #[tokio::test]
    async fn small_audience_gets_one_task_each() {
        let broker = InMemoryBroker::new();
        let resolver = InMemoryAudienceResolver::new().with_connections("author", friends(7));
        let report = scheduler(resolver, &broker).schedule(&post("author")).await.unwrap();

        assert_eq!(report.selected, 7);
        assert_eq!(report.tasks_published, 7);
        let tasks = broker.pending_tasks();
        assert_eq!(tasks.len(), 7);
        assert!(tasks.iter().all(|t| t.post_id.as_str() == "post-1"));
        assert!(tasks.iter().all(|t| t.event.event_type == FeedEventType::PostCreated));
    }

    #[tokio::test]
    async fn large_audience_is_capped() {
        let broker = InMemoryBroker::new();
        let resolver = InMemoryAudienceResolver::new().with_connections("author", friends(150));
        let report = scheduler(resolver, &broker).schedule(&post("author")).await.unwrap();

        assert_eq!(report.audience, 150);
        assert_eq!(report.selected, 100);
        let recipients: HashSet<String> = broker
            .pending_tasks()
            .into_iter()
            .map(|t| t.recipient_id.to_string())
            .collect();
        assert_eq!(recipients.len(), 100);
    }

    #[tokio::test]
    async fn author_and_invalid_ids_are_skipped() {
        let broker = InMemoryBroker::new();
        let resolver = InMemoryAudienceResolver::new()
            .with_connections("author", ["a", "", "   ", "b"]);
        // Self-referential connection.
        resolver.connect("author", "author");

        let report = scheduler(resolver, &broker).schedule(&post("author")).await.unwrap();

        assert_eq!(report.audience, 5);
        assert_eq!(report.skipped, 3);
        assert_eq!(report.tasks_published, 2);
        assert!(broker
            .pending_tasks()
            .iter()
            .all(|t| t.recipient_id.as_str() != "author"));
    }

    #[tokio::test]
    async fn empty_audience_is_a_successful_no_op() {
        let broker = InMemoryBroker::new();
        let report = scheduler(InMemoryAudienceResolver::new(), &broker)
            .schedule(&post("loner"))
            .await
            .unwrap();

        assert_eq!(report, FanoutReport::default());
        assert!(broker.pending_tasks().is_empty());
    }

    #[tokio::test]
    async fn resolver_failure_aborts_without_tasks() {
        let broker = InMemoryBroker::new();
        let resolver = InMemoryAudienceResolver::new().with_connections("author", friends(3));
        resolver.set_unavailable(true);

        let err = scheduler(resolver, &broker)
            .schedule(&post("author"))
            .await
            .unwrap_err();

        assert_eq!(err.code, ErrorCode::AudienceUnavailable);
        assert!(broker.pending_tasks().is_empty());
    }

    #[tokio::test]
    async fn live_event_routed_per_recipient() {
        let broker = InMemoryBroker::new();
        let mut live = broker.subscribe_live().await.unwrap();
        let resolver = InMemoryAudienceResolver::new().with_connections("author", ["only"]);

        scheduler(resolver, &broker).schedule(&post("author")).await.unwrap();

        let delivery = live.next().await.unwrap().unwrap();
        assert_eq!(delivery.routing_key, "feed.event.only");
        let event: FeedEvent = serde_json::from_slice(&delivery.body).unwrap();
        assert_eq!(event.post_id.as_str(), "post-1");
    }

    /// Task queue that fails for one recipient.
    struct FlakyQueue {
        inner: InMemoryBroker,
        poisoned: &'static str,
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl TaskQueue for FlakyQueue {
        async fn publish_task(&self, task: &FeedUpdateTask) -> Result<(), BrokerError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            if task.recipient_id.as_str() == self.poisoned {
                return Err(BrokerError::Publish("channel closed".into()));
            }
            self.inner.publish_task(task).await
        }

        async fn consume_tasks(&self) -> Result<Box<dyn TaskConsumer>, BrokerError> {
            self.inner.consume_tasks().await
        }
    }

    #[tokio::test]
    async fn one_failed_publish_does_not_stop_the_rest() {
        let broker = InMemoryBroker::new();
        let queue = Arc::new(FlakyQueue {
            inner: broker.clone(),
            poisoned: "b",
            attempts: AtomicUsize::new(0),
        });
        let resolver = InMemoryAudienceResolver::new().with_connections("author", ["a", "b", "c"]);
        let scheduler = FanoutScheduler::new(Arc::new(resolver), queue.clone(), Arc::new(broker.clone()))
            .with_sampler(Arc::new(TruncatingSampler));

        let report = scheduler.schedule(&post("author")).await.unwrap();

        assert_eq!(queue.attempts.load(Ordering::SeqCst), 3);
        assert_eq!(report.tasks_published, 2);
        assert_eq!(report.tasks_failed, 1);
        assert_eq!(report.live_published, 3);
        assert!(!report.is_complete());
        assert_eq!(broker.pending_tasks().len(), 2);
    }

    #[tokio::test]
    async fn custom_cap_is_honoured() {
        let broker = InMemoryBroker::new();
        let resolver = InMemoryAudienceResolver::new().with_connections("author", friends(20));
        let report = scheduler(resolver, &broker)
            .with_max_audience(5)
            .schedule(&post("author"))
            .await
            .unwrap();
        assert_eq!(report.selected, 5);
        assert_eq!(broker.pending_tasks().len(), 5);
    }

    #[tokio::test]
    async fn plan_publishes_nothing_until_delivered() {
        let broker = InMemoryBroker::new();
        let resolver = InMemoryAudienceResolver::new().with_connections("author", friends(4));
        let scheduler = Arc::new(scheduler(resolver, &broker));

        let plan = scheduler.plan(&post("author")).await.unwrap();
        assert_eq!(plan.recipients().len(), 4);
        assert_eq!(plan.report().selected, 4);
        assert!(broker.pending_tasks().is_empty());

        scheduler.spawn_delivery(plan);
        scheduler.drain().await;

        assert_eq!(scheduler.deliveries_in_flight(), 0);
        assert_eq!(broker.pending_tasks().len(), 4);
    }
}
