//! The uniform result envelope returned by every client operation.
//!
//! A failed operation is a value, never a panic or an `Err` crossing the client boundary.
//! All result types implement [`OperationResult`], which guarantees that
//! [`OperationResult::error_message`] is `Some` exactly when the operation failed.
use crate::error::Error;
use crate::value::{DataType, Value};

/// Common accessors of every result type.
pub trait OperationResult {
    fn is_success(&self) -> bool;

    /// Human readable failure description, `None` on success.
    fn error_message(&self) -> Option<String>;

    /// `0` on success, otherwise the device-reported or kind-specific error code.
    fn error_code(&self) -> i32;
}

/// A successfully decoded read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reading {
    pub value: Value,
    pub data_type: DataType,
}

/// Result of a single read.
#[derive(Debug)]
pub struct ReadResult {
    pub address: String,
    pub outcome: Result<Reading, Error>,
}

impl ReadResult {
    pub fn success(address: &str, value: Value, data_type: DataType) -> Self {
        Self {
            address: address.to_string(),
            outcome: Ok(Reading { value, data_type }),
        }
    }

    pub fn failure(address: &str, error: Error) -> Self {
        Self {
            address: address.to_string(),
            outcome: Err(error),
        }
    }

    pub(crate) fn from_outcome(address: &str, outcome: Result<Reading, Error>) -> Self {
        Self {
            address: address.to_string(),
            outcome,
        }
    }

    pub fn value(&self) -> Option<&Value> {
        self.outcome.as_ref().ok().map(|reading| &reading.value)
    }

    pub fn data_type(&self) -> Option<DataType> {
        self.outcome.as_ref().ok().map(|reading| reading.data_type)
    }

    pub fn error(&self) -> Option<&Error> {
        self.outcome.as_ref().err()
    }
}

impl OperationResult for ReadResult {
    fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    fn error_message(&self) -> Option<String> {
        self.error().map(|e| e.to_string())
    }

    fn error_code(&self) -> i32 {
        self.error().map_or(0, Error::code)
    }
}

/// Result of a single write.
#[derive(Debug)]
pub struct WriteResult {
    pub address: String,
    pub value: Value,
    pub outcome: Result<(), Error>,
}

impl WriteResult {
    pub fn success(address: &str, value: Value) -> Self {
        Self::from_outcome(address, value, Ok(()))
    }

    pub fn failure(address: &str, value: Value, error: Error) -> Self {
        Self::from_outcome(address, value, Err(error))
    }

    pub(crate) fn from_outcome(address: &str, value: Value, outcome: Result<(), Error>) -> Self {
        Self {
            address: address.to_string(),
            value,
            outcome,
        }
    }

    pub fn error(&self) -> Option<&Error> {
        self.outcome.as_ref().err()
    }
}

impl OperationResult for WriteResult {
    fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    fn error_message(&self) -> Option<String> {
        self.error().map(|e| e.to_string())
    }

    fn error_code(&self) -> i32 {
        self.error().map_or(0, Error::code)
    }
}

fn batch_error<R: OperationResult>(results: &[R], address_of: impl Fn(&R) -> &str) -> Option<String> {
    let failed = results.iter().filter(|r| !r.is_success()).count();
    let first = results.iter().find(|r| !r.is_success())?;
    Some(format!(
        "{failed} of {} entries failed, first at '{}': {}",
        results.len(),
        address_of(first),
        first.error_message().unwrap_or_default()
    ))
}

/// Ordered per-address results of a batch read.
#[derive(Debug, Default)]
pub struct BatchReadResult {
    pub results: Vec<ReadResult>,
}

impl OperationResult for BatchReadResult {
    fn is_success(&self) -> bool {
        self.results.iter().all(ReadResult::is_success)
    }

    fn error_message(&self) -> Option<String> {
        batch_error(&self.results, |r| r.address.as_str())
    }

    fn error_code(&self) -> i32 {
        self.results
            .iter()
            .find(|r| !r.is_success())
            .map_or(0, ReadResult::error_code)
    }
}

/// Ordered per-address results of a batch write.
#[derive(Debug, Default)]
pub struct BatchWriteResult {
    pub results: Vec<WriteResult>,
}

impl OperationResult for BatchWriteResult {
    fn is_success(&self) -> bool {
        self.results.iter().all(WriteResult::is_success)
    }

    fn error_message(&self) -> Option<String> {
        batch_error(&self.results, |r| r.address.as_str())
    }

    fn error_code(&self) -> i32 {
        self.results
            .iter()
            .find(|r| !r.is_success())
            .map_or(0, WriteResult::error_code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_present_only_on_failure() {
        let ok = ReadResult::success("D0", Value::Words(vec![1]), DataType::Words);
        assert!(ok.is_success());
        assert_eq!(ok.error_message(), None);
        assert_eq!(ok.error_code(), 0);
        assert_eq!(ok.value(), Some(&Value::Words(vec![1])));

        let failed = ReadResult::failure("D0", Error::NotConnected);
        assert!(!failed.is_success());
        assert!(!failed.error_message().unwrap().is_empty());
        assert_eq!(failed.error_code(), -1);
        assert_eq!(failed.value(), None);

        let written = WriteResult::failure("100", Value::U16(3), Error::DeviceError(0x0401));
        assert_eq!(written.error_code(), 0x0401);
        assert!(WriteResult::success("100", Value::U16(3)).error_message().is_none());
    }

    #[test]
    fn batch_aggregates_entries() {
        let empty = BatchReadResult::default();
        assert!(empty.is_success());
        assert_eq!(empty.error_message(), None);

        let batch = BatchReadResult {
            results: vec![
                ReadResult::failure("1", Error::DeviceError(2)),
                ReadResult::success("2", Value::U16(1), DataType::Words),
            ],
        };
        assert!(!batch.is_success());
        assert_eq!(batch.error_code(), 2);
        let message = batch.error_message().unwrap();
        assert!(message.starts_with("1 of 2 entries failed, first at '1'"));

        let writes = BatchWriteResult {
            results: vec![WriteResult::success("D1", Value::U16(1))],
        };
        assert!(writes.is_success());
        assert_eq!(writes.error_code(), 0);
    }
}
