use thiserror::Error;

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

macro_rules! unknowable {
    // Single string version
    ($msg:expr) => {
        crate::Error::Unknowable($msg.to_string())
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Unknowable(format!($fmt, $($arg)*))
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Errors are produced by the image and descriptor layers. The visitor algorithms never let
/// one escape: every `Err` encountered during a walk is reported to the visitor as its
/// `unknown_result()` instead, so a caller driving a walk only ever observes a `bool`.
///
/// # Error Categories
///
/// ## Image Access Errors
/// - [`Error::OutOfBounds`] - A read would leave the image
/// - [`Error::InvalidAddress`] - An address lies below the image base or overflows
/// - [`Error::Empty`] - An image was constructed from an empty buffer
/// - [`Error::FileError`] - Filesystem I/O errors while mapping an image
///
/// ## Metadata Errors
/// - [`Error::Malformed`] - Metadata contradicts its own layout rules
/// - [`Error::NotSupported`] - A metadata kind this crate does not model
/// - [`Error::Unknowable`] - A layout that is valid but cannot be introspected
/// - [`Error::RecursionLimit`] - A hierarchy deeper than the configured limit
///
/// # Examples
///
/// ```rust
/// use metascope::{Error, Image, PointerWidth};
///
/// match Image::from_mem(0x1000, Vec::new(), PointerWidth::Bits64) {
///     Ok(_) => println!("image ready"),
///     Err(Error::Empty) => println!("nothing to inspect"),
///     Err(e) => println!("other error: {e}"),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// An out of bound access was attempted while reading the image.
    ///
    /// This error occurs when trying to read data beyond the end of the image.
    /// It's a safety check to prevent buffer overruns while walking metadata.
    #[error("Out of Bound read would have occurred!")]
    OutOfBounds,

    /// An address could not be translated into the image.
    ///
    /// Raised for addresses below the image base and for address arithmetic that
    /// overflows, e.g. a relative reference pointing before address zero.
    #[error("Address 0x{0:x} is not mapped by this image")]
    InvalidAddress(u64),

    /// The metadata is damaged and could not be interpreted.
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

    /// This metadata kind is not supported.
    #[error("This metadata kind is not supported")]
    NotSupported,

    /// Provided input was empty.
    #[error("Provided input was empty")]
    Empty,

    /// The layout is well-formed but cannot be introspected.
    ///
    /// Missing reflection metadata, captures requiring generic substitution and
    /// unresolvable type names all end up here. Walkers map this to the visitor's
    /// unknown policy rather than treating it as corruption.
    #[error("Layout cannot be introspected - {0}")]
    Unknowable(String),

    /// Recursion limit reached.
    ///
    /// Superclass chains and nested value walks are bounded to survive cyclic
    /// metadata. The associated value shows the limit that was reached.
    #[error("Reach the maximum recursion level allowed - {0}")]
    RecursionLimit(usize),

    /// File I/O error.
    ///
    /// Wraps standard I/O errors that can occur while opening or mapping an
    /// image dump from disk.
    #[error("{0}")]
    FileError(#[from] std::io::Error),
}
