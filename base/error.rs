// This file is part of onvifd, an ONVIF camera daemon for embedded devices.
// Copyright (C) 2026 The onvifd Authors; see AUTHORS and LICENSE.txt.
// SPDX-License-Identifier: GPL-3.0-or-later

use std::fmt;

/// Error kind.
///
/// One variant per failure class the daemon distinguishes; the SOAP layer
/// and the HTTP layer each map these onto their own wire representations.
#[derive(Copy, Clone, Eq, PartialEq, Debug, thiserror::Error)]
#[non_exhaustive]
#[rustfmt::skip]
pub enum ErrorKind {
    #[error("invalid argument")] Invalid,
    #[error("not found")] NotFound,
    #[error("not supported")] NotSupported,
    #[error("authentication failed")] Auth,
    #[error("I/O error")] Io,
    #[error("resource exhausted")] Resource,
    #[error("parse error")] Parse,
    #[error("internal error")] Internal,
    #[error("unavailable")] Unavailable,
    #[error("cancelled")] Cancelled,
}

/// An error with a classified kind and a short, redacted detail message.
///
/// The message must already be safe to show to operators; nothing here
/// appends file paths, stack traces, or peer-supplied secrets.
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    msg: Option<Box<str>>,
}

impl Error {
    pub fn new(kind: ErrorKind, msg: Option<String>) -> Self {
        Error {
            kind,
            msg: msg.map(String::into_boxed_str),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn msg(&self) -> Option<&str> {
        self.msg.as_deref()
    }

    /// Returns the same message under a different kind.
    pub fn map_kind(mut self, kind: ErrorKind) -> Self {
        self.kind = kind;
        self
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.msg {
            None => fmt::Display::fmt(&self.kind, f),
            Some(ref m) => write!(f, "{}: {}", self.kind, m),
        }
    }
}

impl std::error::Error for Error {}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Error {
        Error { kind, msg: None }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Error {
        Error::new(ErrorKind::Io, Some(e.to_string()))
    }
}

/// Extension methods for `Result`.
pub trait ResultExt<T, E> {
    /// Annotates an error with the given kind, keeping its own message as the detail.
    fn err_kind(self, k: ErrorKind) -> Result<T, Error>;
}

impl<T, E> ResultExt<T, E> for Result<T, E>
where
    E: fmt::Display,
{
    fn err_kind(self, k: ErrorKind) -> Result<T, Error> {
        self.map_err(|e| Error::new(k, Some(e.to_string())))
    }
}

/// Constructs an [`Error`], the first argument naming an [`ErrorKind`] variant.
///
/// Example:
/// ```
/// use onvifd_base::err;
/// let e = err!(NotFound, "no such profile {:?}", "MainProfile");
/// assert_eq!(e.kind(), onvifd_base::ErrorKind::NotFound);
/// ```
#[macro_export]
macro_rules! err {
    ($k:ident) => {
        $crate::Error::new($crate::ErrorKind::$k, None)
    };
    ($k:ident, $fmt:expr) => {
        $crate::Error::new($crate::ErrorKind::$k, Some(format!($fmt)))
    };
    ($k:ident, $fmt:expr, $($arg:tt)+) => {
        $crate::Error::new($crate::ErrorKind::$k, Some(format!($fmt, $($arg)+)))
    };
}

/// Like [`err!`], but returns from the enclosing function.
#[macro_export]
macro_rules! bail {
    ($k:ident) => {
        return Err($crate::err!($k).into())
    };
    ($k:ident, $fmt:expr) => {
        return Err($crate::err!($k, $fmt).into())
    };
    ($k:ident, $fmt:expr, $($arg:tt)+) => {
        return Err($crate::err!($k, $fmt, $($arg)+).into())
    };
}
