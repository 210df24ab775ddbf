#[cfg(feature = "server")]
mod forward;

#[cfg(feature = "server")]
pub(crate) use self::forward::ForwardConn;
