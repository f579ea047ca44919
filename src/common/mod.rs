pub mod errors;

use std::sync::LazyLock;

use tokio::runtime::{Builder, Runtime};

/// Display format for every timestamp that leaves the process.
pub const DATETIME_STRSAFE: &str = "%Y-%m-%d %H:%M:%S";

/// Suffix appended to uploaded and processed object names.
pub const OBJECT_NAME_TIMESTAMP: &str = "%Y_%m_%d_%H_%M_%S_%s";

pub const DEFAULT_QUEUE_NAME: &str = "imagetasks";

/// Number of Bitdocs shown on the front page.
pub const FRONT_PAGE_LIMIT: usize = 100;

pub const DEFAULT_LIST_LIMIT: usize = 10;

pub const ANONYMOUS_OWNER: &str = "Anonymous";

pub const NO_IMAGE_LINK: &str = "http://commondatastorage.googleapis.com/8bit-images%2Fnoimage.gif";

pub const MISSING_IMAGE_LINK: &str =
    "http://commondatastorage.googleapis.com/8bit-images%2Fbucket_missing_image.png";

/// Reasons the queue uses when it refuses a lease because of rate limiting.
pub const RATE_LIMIT_REASONS: &[&str] = &[
    "rateLimitExceeded",
    "Rate Limit Exceeded",
    "userRateLimitExceeded",
    "User Rate Limit Exceeded",
];

/// Signed upload policies stay valid for this many seconds.
pub const UPLOAD_POLICY_TTL_SECS: i64 = 3600;

/// Login tokens stay valid for a week.
pub const LOGIN_TOKEN_TTL_SECS: u64 = 7 * 24 * 3600;

pub static CURRENT_NUM_THREADS: LazyLock<usize> = LazyLock::new(rayon::current_num_threads);

// Dedicated to the web front end and its stand-in platform APIs.
pub static ROCKET_RUNTIME: LazyLock<Runtime> = LazyLock::new(|| {
    Builder::new_multi_thread()
        .worker_threads(*CURRENT_NUM_THREADS)
        .thread_name("rocket-io-worker")
        .enable_all()
        .build()
        .expect("Failed to build Rocket Tokio runtime")
});

// The daemon only serves heartbeat requests and waits for Ctrl-C here.
pub static HEARTBEAT_RUNTIME: LazyLock<Runtime> = LazyLock::new(|| {
    Builder::new_multi_thread()
        .worker_threads(1)
        .thread_name("heartbeat-worker")
        .enable_all()
        .build()
        .expect("Failed to build heartbeat Tokio runtime")
});
