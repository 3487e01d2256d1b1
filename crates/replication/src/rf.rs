//! Replication factor: the `ack/from` pair of a request.

use std::fmt;

#[derive(Debug, thiserror::Error)]
pub enum RfError {
    #[error("malformed replicas parameter: {0:?}")]
    Malformed(String),
    #[error("replication factor out of range: ack={ack} from={from} cluster={n}")]
    OutOfRange { ack: usize, from: usize, n: usize },
}

/// A validated `(ack, from)` pair: wait for `ack` acknowledgements out of
/// `from` replicas, `1 <= ack <= from <= N`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rf {
    pub ack: usize,
    pub from: usize,
}

impl Rf {
    /// The default for an `n`-node cluster: a majority out of all nodes.
    pub fn default_for(n: usize) -> Self {
        Self {
            ack: n / 2 + 1,
            from: n,
        }
    }

    /// Parse the `replicas=ack/from` request parameter against a cluster of
    /// `n` nodes, substituting the majority default when absent.
    pub fn parse(param: Option<&str>, n: usize) -> Result<Self, RfError> {
        let rf = match param {
            None => Self::default_for(n),
            Some(raw) => {
                let (ack, from) = raw
                    .split_once('/')
                    .ok_or_else(|| RfError::Malformed(raw.to_string()))?;
                let ack = ack
                    .parse::<usize>()
                    .map_err(|_| RfError::Malformed(raw.to_string()))?;
                let from = from
                    .parse::<usize>()
                    .map_err(|_| RfError::Malformed(raw.to_string()))?;
                Self { ack, from }
            }
        };
        if rf.ack < 1 || rf.from < rf.ack || rf.from > n {
            return Err(RfError::OutOfRange {
                ack: rf.ack,
                from: rf.from,
                n,
            });
        }
        Ok(rf)
    }
}

impl fmt::Display for Rf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.ack, self.from)
    }
}
