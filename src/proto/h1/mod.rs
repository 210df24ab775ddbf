pub(crate) use self::decode::Decoder;
pub(crate) use self::io::Buffered;
#[cfg(feature = "server")]
pub(crate) use self::io::{DEFAULT_MAX_BUFFER_SIZE, MINIMUM_MAX_BUFFER_SIZE};

#[cfg(feature = "server")]
pub(crate) mod date;
mod decode;
mod io;
pub(crate) mod role;

pub(crate) type ParseResult<T> = Result<Option<T>, crate::error::Parse>;
