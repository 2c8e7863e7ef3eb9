//! Error taxonomy shared by buffers, the graph walker and pipeline operations.
//!
//! Every fallible operation returns [`Result<Status>`](Result) or
//! `Result<T>`. Traversal early-exit is *not* an error: it is reported as
//! [`Status::PathStop`] in the `Ok` branch so that callers can tell "halted on
//! purpose" apart from a failure.

use thiserror::Error;

use crate::buffer::BufferId;
use crate::component::ComponentId;
use crate::pipeline::PipelineId;

const EINVAL: i32 = 22;
const ENOMEM: i32 = 12;
const EBUSY: i32 = 16;
const ENODATA: i32 = 61;

/// Errors produced by the firmware core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Error {
    /// Bad size, state or command.
    #[error("invalid argument")]
    InvalidArgument,

    /// The memory pool could not satisfy a request.
    #[error("out of memory")]
    OutOfMemory,

    /// The resource is held elsewhere.
    #[error("resource busy")]
    Busy,

    /// A capture pipeline cannot be fed.
    #[error("no data available")]
    NoData,

    /// Opaque driver failure, passed through unmodified.
    #[error("device error {0}")]
    Device(i32),

    /// No component with this id is registered.
    #[error("component {0} not found")]
    ComponentNotFound(ComponentId),

    /// No buffer with this id is registered.
    #[error("buffer {0} not found")]
    BufferNotFound(BufferId),

    /// No pipeline with this id is registered.
    #[error("pipeline {0} not found")]
    PipelineNotFound(PipelineId),
}

impl Error {
    /// Negative errno-style code reported back to the IPC caller.
    ///
    /// Driver errors keep their own code; lookup failures report `-EINVAL`.
    pub fn errno(self) -> i32 {
        match self {
            Self::InvalidArgument
            | Self::ComponentNotFound(_)
            | Self::BufferNotFound(_)
            | Self::PipelineNotFound(_) => -EINVAL,
            Self::OutOfMemory => -ENOMEM,
            Self::Busy => -EBUSY,
            Self::NoData => -ENODATA,
            Self::Device(code) => {
                if code > 0 {
                    -code
                } else {
                    code
                }
            }
        }
    }
}

/// Successful outcome of a walk step or driver operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Status {
    /// Keep going.
    #[default]
    Continue,
    /// Halt the traversal at this point. Reported to callers as success.
    PathStop,
}

impl Status {
    /// Numeric status as seen by the IPC layer (`0` or `1`).
    pub fn code(self) -> i32 {
        match self {
            Self::Continue => 0,
            Self::PathStop => 1,
        }
    }

    /// True for [`Status::PathStop`].
    #[inline]
    pub fn is_stop(self) -> bool {
        self == Self::PathStop
    }
}

/// Convenience result type for core operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Collapses a walk outcome into the numeric status returned to the IPC layer.
pub fn status_code(result: Result<Status>) -> i32 {
    match result {
        Ok(status) => status.code(),
        Err(err) => err.errno(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errno_codes_are_negative() {
        assert_eq!(Error::InvalidArgument.errno(), -22);
        assert_eq!(Error::OutOfMemory.errno(), -12);
        assert_eq!(Error::Busy.errno(), -16);
        assert_eq!(Error::NoData.errno(), -61);
        assert_eq!(Error::PipelineNotFound(PipelineId(3)).errno(), -22);
    }

    #[test]
    fn device_error_passes_through() {
        assert_eq!(Error::Device(-5).errno(), -5);
        assert_eq!(Error::Device(5).errno(), -5);
    }

    #[test]
    fn path_stop_reports_success() {
        assert_eq!(status_code(Ok(Status::PathStop)), 1);
        assert_eq!(status_code(Ok(Status::Continue)), 0);
        assert_eq!(status_code(Err(Error::NoData)), -61);
    }

    #[test]
    fn display_names_the_missing_id() {
        let msg = Error::ComponentNotFound(ComponentId(7)).to_string();
        assert_eq!(msg, "component ComponentId(7) not found");
    }
}
