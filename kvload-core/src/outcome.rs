use std::fmt;
use std::time::Duration;

/// Which path an iteration took.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    Read,
    Write,
}

impl Operation {
    pub const ALL: [Operation; 2] = [Operation::Read, Operation::Write];

    pub fn tags(&self) -> Tags {
        match self {
            Operation::Read => Tags {
                name: "GET /kvs/:key",
                op: None,
            },
            Operation::Write => Tags {
                name: "PUT /kvs/:key",
                op: Some("set"),
            },
        }
    }

    /// The checks evaluated against every response of this operation.
    pub fn checks(&self) -> [Check; 2] {
        match self {
            Operation::Read => [Check::ReadStatus, Check::No5xx],
            Operation::Write => [Check::Success, Check::No5xx],
        }
    }

    pub fn index(&self) -> usize {
        match self {
            Operation::Read => 0,
            Operation::Write => 1,
        }
    }
}

/// Labels attached to a request for later aggregation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Tags {
    pub name: &'static str,
    pub op: Option<&'static str>,
}

/// A named assertion on a response status. A missing status (transport failure) never passes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Check {
    /// `200/404`: a read either hit or missed.
    ReadStatus,
    /// `2xx`
    Success,
    /// `no_5xx`, shared by both paths.
    No5xx,
}

impl Check {
    pub const ALL: [Check; 3] = [Check::ReadStatus, Check::Success, Check::No5xx];

    pub fn name(&self) -> &'static str {
        match self {
            Check::ReadStatus => "200/404",
            Check::Success => "2xx",
            Check::No5xx => "no_5xx",
        }
    }

    pub fn evaluate(&self, status: Option<u16>) -> bool {
        let Some(status) = status else {
            return false;
        };

        match self {
            Check::ReadStatus => status == 200 || status == 404,
            Check::Success => (200..300).contains(&status),
            Check::No5xx => status < 500,
        }
    }

    pub fn index(&self) -> usize {
        match self {
            Check::ReadStatus => 0,
            Check::Success => 1,
            Check::No5xx => 2,
        }
    }
}

impl fmt::Display for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CheckResult {
    pub check: Check,
    pub passed: bool,
}

/// Result of a single iteration, consumed by whichever executor ran it.
#[derive(Clone, Debug)]
pub struct RequestOutcome {
    pub operation: Operation,
    pub tags: Tags,
    /// `None` when the request never produced a response.
    pub status: Option<u16>,
    pub latency: Duration,
    pub checks: [CheckResult; 2],
    pub error: Option<String>,
    /// Request body bytes sent.
    pub bytes_sent: u64,
    /// Response body bytes received.
    pub bytes_received: u64,
}

impl RequestOutcome {
    pub fn new(operation: Operation, status: Option<u16>, latency: Duration) -> Self {
        let checks = operation.checks().map(|check| CheckResult {
            check,
            passed: check.evaluate(status),
        });

        Self {
            operation,
            tags: operation.tags(),
            status,
            latency,
            checks,
            error: None,
            bytes_sent: 0,
            bytes_received: 0,
        }
    }

    pub fn with_bytes(mut self, sent: u64, received: u64) -> Self {
        self.bytes_sent = sent;
        self.bytes_received = received;
        self
    }

    pub fn transport_error(operation: Operation, latency: Duration, error: String) -> Self {
        let mut outcome = Self::new(operation, None, latency);
        outcome.error = Some(error);
        outcome
    }

    /// A request counts as failed without a response or with a status outside `[200, 400)`.
    pub fn failed(&self) -> bool {
        !matches!(self.status, Some(200..=399))
    }

    pub fn check(&self, check: Check) -> Option<bool> {
        self.checks
            .iter()
            .find(|c| c.check == check)
            .map(|c| c.passed)
    }

    /// Status class used as a metrics label.
    pub fn status_class(&self) -> &'static str {
        match self.status {
            None => "error",
            Some(100..=199) => "1xx",
            Some(200..=299) => "2xx",
            Some(300..=399) => "3xx",
            Some(400..=499) => "4xx",
            Some(_) => "5xx",
        }
    }
}
