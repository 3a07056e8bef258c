//! # Constants
//!
//! Shared constants used throughout the controller.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// Name reported on Kubernetes events and used as the field manager
pub const CONTROLLER_NAME: &str = "eventing-controller";

/// Finalizer guarding backend cleanup before a Subscription is removed
pub const SUBSCRIPTION_FINALIZER: &str = "eventing.octopilot.io/subscription-finalizer";

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 5000;

/// Default requeue delay when a backend subscription is not yet visible (seconds)
pub const DEFAULT_MISSING_SUBSCRIPTION_REQUEUE_SECS: u64 = 10;

/// Default requeue delay while a backend subscription is not yet active (seconds)
pub const DEFAULT_INACTIVE_REQUEUE_SECS: u64 = 2;

/// Default periodic resync interval for healthy subscriptions (seconds)
pub const DEFAULT_RESYNC_INTERVAL_SECS: u64 = 600;

/// Default exponential backoff starting value (milliseconds)
pub const DEFAULT_BACKOFF_START_MS: u64 = 1000;

/// Default exponential backoff maximum value (milliseconds)
pub const DEFAULT_BACKOFF_MAX_MS: u64 = 300_000;

/// Default delay before restarting watch stream after unknown errors (seconds)
pub const DEFAULT_WATCH_RESTART_DELAY_SECS: u64 = 5;

/// Default delay before restarting watch stream after it ends (seconds)
pub const DEFAULT_WATCH_RESTART_DELAY_AFTER_END_SECS: u64 = 1;

/// How long an event-mesh subscription may stay inactive before it is reported as failed
pub const DEFAULT_ACTIVATION_TIMEOUT_SECS: u64 = 60;

/// Default prefix for backend subjects
pub const DEFAULT_EVENT_TYPE_PREFIX: &str = "octopilot.events";

/// Config key holding the delivery concurrency of a Subscription
pub const MAX_IN_FLIGHT_MESSAGES_KEY: &str = "maxInFlightMessages";

/// Value written by the defaulter when `maxInFlightMessages` is missing
pub const DEFAULT_MAX_IN_FLIGHT_MESSAGES: &str = "10";

/// Event types may not start with this prefix unless type matching is exact
pub const RESERVED_TYPE_PREFIX: &str = "octopilot.custom";

/// Minimum number of dot separated segments in an event type
pub const MIN_EVENT_TYPE_SEGMENTS: usize = 2;

/// Sinks must point at a cluster-local service
pub const CLUSTER_LOCAL_URL_SUFFIX: &str = "svc.cluster.local";

/// `<service>.<namespace>.svc.cluster.local`
pub const SINK_HOST_SEGMENTS: usize = 5;

/// Event-mesh subjects may not exceed this many segments
pub const EVENT_MESH_SUBJECT_SEGMENT_LIMIT: usize = 7;

/// Event-mesh subscription names may not exceed this length
pub const EVENT_MESH_MAX_NAME_LENGTH: usize = 50;

/// Attempts for a read-modify-write against a shared resource before giving up
pub const MAX_CONFLICT_RETRIES: usize = 5;

/// Label keys identifying the APIRule of a subscriber service
pub const LABEL_SERVICE_NAME: &str = "eventing.octopilot.io/service-name";
pub const LABEL_SERVICE_PORT: &str = "eventing.octopilot.io/service-port";
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// HTTP methods exposed on webhook routes
pub const WEBHOOK_METHODS: [&str; 2] = ["POST", "OPTIONS"];

/// Access strategy handler applied to webhook routes
pub const WEBHOOK_AUTH_HANDLER: &str = "jwt";
