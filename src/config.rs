use crate::errors::ProcessorError::{self, CommandLineError};
use crate::queue::ReceiveRequest;
use clap::{Arg, ArgMatches, Command};
use rusoto_core::Region;
use std::ffi::OsString;
use std::str::FromStr;
use std::time::Duration;

pub type Port = u16;

pub const DEFAULT_REGION: &str = "us-east-2";
pub const DEFAULT_QUEUE_URL: &str = "http://localhost:4566/000000000000/email-queue";
pub const DEFAULT_BUCKET: &str = "email-data-bucket";
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 5000;
pub const DEFAULT_MAX_MESSAGES: i64 = 10;
pub const DEFAULT_WAIT_TIME_SECONDS: i64 = 20;
pub const DEFAULT_VISIBILITY_TIMEOUT_SECONDS: i64 = 30;
pub const DEFAULT_DRAIN_BUDGET_SECONDS: u64 = 30;
pub const DEFAULT_WORKER_ID: &str = "sqs-worker";
pub const DEFAULT_KEY_PREFIX: &str = "emails";

/// How often the drain loop looks at the active task count
pub const DRAIN_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Region name used to sign requests against a local endpoint
const LOCAL_REGION_NAME: &str = "us-east-1";

#[derive(Debug, Clone, PartialEq)]
pub enum Mode {
    /// A local endpoint (LocalStack, ElasticMQ) serving on localhost
    Local(Port),
    AWS(Region),
}

impl Mode {
    pub fn region(&self) -> Region {
        match self {
            Mode::AWS(region) => region.to_owned(),
            Mode::Local(port) => Region::Custom {
                name: LOCAL_REGION_NAME.to_owned(),
                endpoint: format!("http://localhost:{}", port),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub mode: Mode,
    pub queue_url: String,
    pub bucket: String,
    pub poll_interval: Duration,
    pub max_messages: i64,
    pub wait_time_seconds: i64,
    pub visibility_timeout_seconds: i64,
    pub drain_budget: Duration,
    pub drain_check_interval: Duration,
    pub worker_id: String,
    pub key_prefix: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            mode: Mode::AWS(Region::UsEast2),
            queue_url: DEFAULT_QUEUE_URL.to_owned(),
            bucket: DEFAULT_BUCKET.to_owned(),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            max_messages: DEFAULT_MAX_MESSAGES,
            wait_time_seconds: DEFAULT_WAIT_TIME_SECONDS,
            visibility_timeout_seconds: DEFAULT_VISIBILITY_TIMEOUT_SECONDS,
            drain_budget: Duration::from_secs(DEFAULT_DRAIN_BUDGET_SECONDS),
            drain_check_interval: DRAIN_CHECK_INTERVAL,
            worker_id: DEFAULT_WORKER_ID.to_owned(),
            key_prefix: DEFAULT_KEY_PREFIX.to_owned(),
        }
    }
}

impl Config {
    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_queue_url(mut self, queue_url: &str) -> Self {
        self.queue_url = queue_url.to_owned();
        self
    }

    pub fn with_bucket(mut self, bucket: &str) -> Self {
        self.bucket = bucket.to_owned();
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_max_messages(mut self, max_messages: i64) -> Self {
        self.max_messages = max_messages;
        self
    }

    pub fn with_drain_budget(mut self, drain_budget: Duration) -> Self {
        self.drain_budget = drain_budget;
        self
    }

    pub fn with_worker_id(mut self, worker_id: &str) -> Self {
        self.worker_id = worker_id.to_owned();
        self
    }

    pub fn receive_request(&self) -> ReceiveRequest {
        ReceiveRequest {
            max_messages: self.max_messages,
            wait_seconds: self.wait_time_seconds,
            visibility_timeout_seconds: self.visibility_timeout_seconds,
        }
    }
}

/// Raw option values, from flags or from the environment
#[derive(Debug, Default)]
pub struct Cli {
    maybe_local: Option<String>,
    maybe_region: Option<String>,
    maybe_queue_url: Option<String>,
    maybe_bucket: Option<String>,
    maybe_poll_interval: Option<String>,
    maybe_max_messages: Option<String>,
    maybe_wait_time: Option<String>,
    maybe_visibility_timeout: Option<String>,
    maybe_drain_budget: Option<String>,
    maybe_worker_id: Option<String>,
    maybe_key_prefix: Option<String>,
}

impl Cli {
    pub fn new() -> Self {
        Cli::from_matches(&command().get_matches())
    }

    pub fn from_args<I, T>(args: I) -> Result<Self, ProcessorError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        command()
            .try_get_matches_from(args)
            .map(|matches| Cli::from_matches(&matches))
            .map_err(|e| CommandLineError(e.to_string()))
    }

    fn from_matches(matches: &ArgMatches) -> Self {
        let value_of = |id: &str| matches.get_one::<String>(id).cloned();
        Cli {
            maybe_local: value_of("local"),
            maybe_region: value_of("region"),
            maybe_queue_url: value_of("queue-url"),
            maybe_bucket: value_of("bucket"),
            maybe_poll_interval: value_of("poll-interval"),
            maybe_max_messages: value_of("max-messages"),
            maybe_wait_time: value_of("wait-time"),
            maybe_visibility_timeout: value_of("visibility-timeout"),
            maybe_drain_budget: value_of("drain-budget"),
            maybe_worker_id: value_of("worker-id"),
            maybe_key_prefix: value_of("key-prefix"),
        }
    }

    pub fn determine_mode(&self) -> Result<Mode, ProcessorError> {
        if let Some(port_string) = self.maybe_local.clone() {
            port_string
                .parse::<Port>()
                .map_err(|_| CommandLineError(format!("Invalid Port: {}", port_string)))
                .map(Mode::Local)
        } else {
            let region_string = self
                .maybe_region
                .clone()
                .unwrap_or_else(|| DEFAULT_REGION.to_owned());
            Region::from_str(region_string.as_ref())
                .map_err(|_| {
                    CommandLineError(format!("Invalid region specified: {}", region_string))
                })
                .map(Mode::AWS)
        }
    }

    pub fn build_config(&self) -> Result<Config, ProcessorError> {
        let defaults = Config::default();
        let poll_interval_ms = parse_or(
            &self.maybe_poll_interval,
            "poll interval",
            DEFAULT_POLL_INTERVAL_MS,
        )?;
        let drain_budget_seconds = parse_or(
            &self.maybe_drain_budget,
            "drain budget",
            DEFAULT_DRAIN_BUDGET_SECONDS,
        )?;
        Ok(Config {
            mode: self.determine_mode()?,
            queue_url: non_empty_or(&self.maybe_queue_url, "queue url", defaults.queue_url)?,
            bucket: non_empty_or(&self.maybe_bucket, "bucket", defaults.bucket)?,
            poll_interval: Duration::from_millis(poll_interval_ms),
            max_messages: in_range(
                parse_or(&self.maybe_max_messages, "max messages", DEFAULT_MAX_MESSAGES)?,
                "max messages",
                1,
                10,
            )?,
            wait_time_seconds: in_range(
                parse_or(&self.maybe_wait_time, "wait time", DEFAULT_WAIT_TIME_SECONDS)?,
                "wait time",
                0,
                20,
            )?,
            visibility_timeout_seconds: in_range(
                parse_or(
                    &self.maybe_visibility_timeout,
                    "visibility timeout",
                    DEFAULT_VISIBILITY_TIMEOUT_SECONDS,
                )?,
                "visibility timeout",
                0,
                43_200,
            )?,
            drain_budget: Duration::from_secs(drain_budget_seconds),
            drain_check_interval: DRAIN_CHECK_INTERVAL,
            worker_id: non_empty_or(&self.maybe_worker_id, "worker id", defaults.worker_id)?,
            key_prefix: non_empty_or(&self.maybe_key_prefix, "key prefix", defaults.key_prefix)?,
        })
    }
}

fn parse_or<T: FromStr>(value: &Option<String>, name: &str, default: T) -> Result<T, ProcessorError> {
    match value {
        Some(s) => s
            .trim()
            .parse::<T>()
            .map_err(|_| CommandLineError(format!("Invalid {}: {}", name, s))),
        None => Ok(default),
    }
}

fn in_range(value: i64, name: &str, min: i64, max: i64) -> Result<i64, ProcessorError> {
    if value < min || value > max {
        Err(CommandLineError(format!(
            "{} must be between {} and {}, got {}",
            name, min, max, value
        )))
    } else {
        Ok(value)
    }
}

fn non_empty_or(
    value: &Option<String>,
    name: &str,
    default: String,
) -> Result<String, ProcessorError> {
    match value {
        Some(s) if s.trim().is_empty() => Err(CommandLineError(format!("Empty {}", name))),
        Some(s) => Ok(s.trim().to_owned()),
        None => Ok(default),
    }
}

fn command() -> Command {
    Command::new("sqs-mail-worker")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Moves email records from an SQS queue into S3")
        .arg(
            Arg::new("local")
                .short('l')
                .long("local")
                .env("LOCAL_PORT")
                .value_name("PORT")
                .help("Run against a local SQS/S3 endpoint listening on PORT"),
        )
        .arg(
            Arg::new("region")
                .short('r')
                .long("region")
                .env("AWS_REGION")
                .value_name("REGION")
                .help("The Amazon region of the sqs and s3 services [default: us-east-2]"),
        )
        .arg(
            Arg::new("queue-url")
                .short('q')
                .long("queue-url")
                .env("SQS_QUEUE_URL")
                .value_name("URL")
                .help("The url of the queue to poll"),
        )
        .arg(
            Arg::new("bucket")
                .short('b')
                .long("bucket")
                .env("S3_BUCKET_NAME")
                .value_name("BUCKET")
                .help("The bucket processed payloads are written to"),
        )
        .arg(
            Arg::new("poll-interval")
                .long("poll-interval")
                .env("POLLING_INTERVAL_MS")
                .value_name("MILLIS")
                .help("Delay between poll cycles [default: 5000]"),
        )
        .arg(
            Arg::new("max-messages")
                .long("max-messages")
                .env("MAX_MESSAGES")
                .value_name("COUNT")
                .help("Messages requested per poll, 1 to 10 [default: 10]"),
        )
        .arg(
            Arg::new("wait-time")
                .long("wait-time")
                .env("WAIT_TIME_SECONDS")
                .value_name("SECONDS")
                .help("Long poll wait time, 0 to 20 [default: 20]"),
        )
        .arg(
            Arg::new("visibility-timeout")
                .long("visibility-timeout")
                .env("VISIBILITY_TIMEOUT_SECONDS")
                .value_name("SECONDS")
                .help("Visibility timeout of received messages [default: 30]"),
        )
        .arg(
            Arg::new("drain-budget")
                .long("drain-budget")
                .env("DRAIN_BUDGET_SECONDS")
                .value_name("SECONDS")
                .help("How long shutdown waits for in-flight messages [default: 30]"),
        )
        .arg(
            Arg::new("worker-id")
                .long("worker-id")
                .env("WORKER_ID")
                .value_name("ID")
                .help("Identity recorded in processed payloads [default: sqs-worker]"),
        )
        .arg(
            Arg::new("key-prefix")
                .long("key-prefix")
                .env("KEY_PREFIX")
                .value_name("PREFIX")
                .help("Top level prefix of stored keys [default: emails]"),
        )
}
