//! Ring configuration.
//!
//! Every process participating in the same overlay must agree on the
//! hash function (and therefore the identifier width m) and on the
//! successor list length, otherwise their views of the ring are not
//! wire-compatible.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use digest::DynDigest;
use rand::Rng;
use sha1::Sha1;

use crate::delegate::Delegate;
use crate::error::Error;
use crate::error::Result;

/// Factory producing fresh hashers, the counterpart of a hash
/// constructor. The identifier width m is derived from the output
/// size of the produced hasher.
pub type HashFactory = Arc<dyn Fn() -> Box<dyn DynDigest + Send> + Send + Sync>;

/// Liveness bar a candidate successor must clear in
/// `check_new_successor` before it is spliced into the head of the
/// successor list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CandidatePolicy {
    /// Adopt only candidates whose liveness probe returned an
    /// explicit ack.
    #[default]
    RequireAck,
    /// Also adopt candidates whose probe failed with a transport
    /// error (liveness unknown); only an explicit "not alive"
    /// answer rejects the candidate.
    AcceptUnknown,
}

/// Configuration for a local ring participant.
#[derive(Clone)]
pub struct Config {
    /// Local host address, also the transport address of every local
    /// vnode.
    pub hostname: String,
    /// Number of vnodes this process runs.
    pub num_vnodes: usize,
    /// Hash constructor used for vnode identifiers and lookup keys.
    pub hash_fn: HashFactory,
    /// Lower bound of the randomized stabilization interval.
    pub stabilize_min: Duration,
    /// Upper bound of the randomized stabilization interval.
    pub stabilize_max: Duration,
    /// Successor list length r.
    pub num_successors: usize,
    /// Adoption policy for candidate successors with unknown liveness.
    pub candidate_policy: CandidatePolicy,
    /// Age after which wire transports reap idle outbound connections.
    pub conn_idle_timeout: Duration,
    /// Invoked to handle ring events.
    pub delegate: Option<Arc<dyn Delegate>>,
}

impl Config {
    /// The default configuration for a host: 8 vnodes, SHA-1
    /// identifiers (m = 160), 8 successors, stabilization every
    /// 15–45 s, no delegate.
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            num_vnodes: 8,
            hash_fn: Arc::new(|| Box::new(Sha1::default())),
            stabilize_min: Duration::from_secs(15),
            stabilize_max: Duration::from_secs(45),
            num_successors: 8,
            candidate_policy: CandidatePolicy::default(),
            conn_idle_timeout: Duration::from_secs(300),
            delegate: None,
        }
    }

    /// Same as [Config::new] with a delegate wired in.
    pub fn with_delegate(hostname: impl Into<String>, delegate: Arc<dyn Delegate>) -> Self {
        let mut conf = Self::new(hostname);
        conf.delegate = Some(delegate);
        conf
    }

    /// Identifier width m in bits, fixed for the ring lifetime.
    pub fn hash_bits(&self) -> usize {
        (self.hash_fn)().output_size() * 8
    }

    /// Hash arbitrary key material into an m-bit ring identifier.
    pub fn hash_key(&self, data: &[u8]) -> Vec<u8> {
        let mut hasher = (self.hash_fn)();
        hasher.update(data);
        hasher.finalize().to_vec()
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.num_vnodes == 0 {
            return Err(Error::InvalidConfig("num_vnodes must be at least 1".into()));
        }
        if self.num_vnodes > u16::MAX as usize + 1 {
            return Err(Error::InvalidConfig(
                "num_vnodes exceeds the 16-bit id derivation index".into(),
            ));
        }
        if self.num_successors == 0 {
            return Err(Error::InvalidConfig(
                "num_successors must be at least 1".into(),
            ));
        }
        if self.stabilize_min > self.stabilize_max {
            return Err(Error::InvalidConfig(
                "stabilize_min must not exceed stabilize_max".into(),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Config")
            .field("hostname", &self.hostname)
            .field("num_vnodes", &self.num_vnodes)
            .field("hash_bits", &self.hash_bits())
            .field("stabilize_min", &self.stabilize_min)
            .field("stabilize_max", &self.stabilize_max)
            .field("num_successors", &self.num_successors)
            .field("candidate_policy", &self.candidate_policy)
            .field("conn_idle_timeout", &self.conn_idle_timeout)
            .field("delegate", &self.delegate.is_some())
            .finish()
    }
}

/// Draw a stabilization delay uniformly from
/// [stabilize_min, stabilize_max]. The randomization keeps the
/// maintenance timers of many vnodes from firing in lockstep.
pub fn rand_stabilize(conf: &Config) -> Duration {
    let min = conf.stabilize_min;
    let max = conf.stabilize_max;
    if max <= min {
        return min;
    }
    let span = (max - min).as_nanos() as u64;
    let jitter = rand::thread_rng().gen_range(0..=span);
    min + Duration::from_nanos(jitter)
}
