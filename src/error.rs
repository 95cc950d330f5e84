use thiserror::Error;

use crate::module::ModuleId;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Most of these never reach application code: the host adapter in
/// [`crate::installer`] turns every recoverable failure into "leave the class untransformed"
/// and reports it through logging and [`crate::module::InstrumentationStatus`]. They surface
/// directly only from construction-time APIs such as [`crate::AgentConfig::from_properties`],
/// [`crate::module::ModuleIndex::from_bytes`] or [`crate::installer::AgentInstaller::install`].
///
/// # Error Categories
///
/// ## Index Decoding Errors
/// - [`Error::OutOfBounds`] - Attempted to read beyond the end of an encoded index
/// - [`Error::Malformed`] - Corrupted or invalid index structure
///
/// ## Registration Errors
/// - [`Error::InvalidModule`] - A module descriptor cannot be registered
///
/// ## Runtime Errors
/// - [`Error::Predicate`] - A type or class-loader predicate failed
/// - [`Error::Transform`] - A module's transform stack failed for one class
/// - [`Error::Host`] - The host runtime rejected an operation
/// - [`Error::Retransform`] - A batch retransformation request was rejected
///
/// ## Configuration and I/O Errors
/// - [`Error::Config`] - A configuration value could not be interpreted
/// - [`Error::Io`] - Filesystem I/O errors
///
/// # Examples
///
/// ```rust
/// use classweave::{AgentConfig, Error};
///
/// match AgentConfig::from_properties([("instrumentation.legacy.installer", "perhaps")]) {
///     Ok(_) => unreachable!(),
///     Err(Error::Config { key, .. }) => assert_eq!(key, "instrumentation.legacy.installer"),
///     Err(e) => panic!("unexpected error: {e}"),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// An out of bound access was attempted while decoding binary data.
    ///
    /// This is the safety check behind the bounds-checked readers in [`crate::utils`].
    #[error("Out of Bound read would have occurred!")]
    OutOfBounds,

    /// The encoded data is damaged and could not be decoded.
    ///
    /// The error includes the source location where the malformation was detected
    /// for debugging purposes.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// A module descriptor could not be registered.
    ///
    /// Registration failures are fatal for the offending module only; the installer
    /// logs them and continues with the remaining modules.
    #[error("Module '{module}' cannot be registered: {reason}")]
    InvalidModule {
        /// Primary name of the rejected module
        module: String,
        /// Why the descriptor was rejected
        reason: String,
    },

    /// A type, class-loader or method predicate failed while being evaluated.
    ///
    /// Failures of [`crate::matcher::TypeMatcher::Custom`] and the other custom predicates
    /// are reported as this variant, as are panics caught while a recorder runs. The
    /// combining matcher treats it as "no contribution" for the recorder that raised it.
    #[error("Predicate '{matcher}' failed: {message}")]
    Predicate {
        /// Description of the failing predicate
        matcher: String,
        /// Failure detail reported by the predicate
        message: String,
    },

    /// The transform stack of a single module failed for the class being defined.
    ///
    /// The splitting transformer wraps every stack failure, panics included, in this
    /// variant before recording it in [`crate::module::InstrumentationStatus`].
    #[error("Transformation {module} failed: {message}")]
    Transform {
        /// Id of the module whose stack failed
        module: ModuleId,
        /// Failure detail
        message: String,
    },

    /// The host runtime rejected an operation.
    #[error("Host runtime error: {0}")]
    Host(String),

    /// The host runtime rejected a batch retransformation request.
    #[error("Retransformation rejected: {0}")]
    Retransform(String),

    /// A configuration value could not be interpreted.
    #[error("Invalid configuration value for '{key}': {message}")]
    Config {
        /// The configuration key
        key: String,
        /// Why the value was rejected
        message: String,
    },

    /// File I/O error.
    ///
    /// Wraps standard I/O errors that can occur while reading or writing a
    /// persisted [`crate::module::ModuleIndex`].
    #[error("{0}")]
    Io(#[from] std::io::Error),

    /// Generic error for miscellaneous failures.
    #[error("{0}")]
    Error(String),
}
