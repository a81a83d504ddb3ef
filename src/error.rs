/* Copyright (C) 2024 Philipp Benner
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program.  If not, see <http://www.gnu.org/licenses/>.
 */

use std::fmt;
use std::io;

/* -------------------------------------------------------------------------- */

/// Error taxonomy for the bbi storage engine.
///
/// Every failure the cursor, the two trees, the container header and the
/// block engine can produce is represented here so that callers can match
/// on `kind()` rather than parse a message string.
#[derive(Debug)]
pub enum BbiError {
    BadMagic,
    UnexpectedEof,
    BufferOverflow,
    Inconsistent(String),
    Unsupported(String),
    Io(io::Error),
}

/* -------------------------------------------------------------------------- */

impl BbiError {
    pub fn inconsistent<S: Into<String>>(msg: S) -> Self {
        BbiError::Inconsistent(msg.into())
    }

    pub fn unsupported<S: Into<String>>(msg: S) -> Self {
        BbiError::Unsupported(msg.into())
    }
}

/* -------------------------------------------------------------------------- */

impl fmt::Display for BbiError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            BbiError::BadMagic           => write!(f, "bad magic: neither byte order matched"),
            BbiError::UnexpectedEof      => write!(f, "unexpected end of file"),
            BbiError::BufferOverflow     => write!(f, "read past the end of a scoped buffer"),
            BbiError::Inconsistent(msg)  => write!(f, "inconsistent file: {}", msg),
            BbiError::Unsupported(msg)   => write!(f, "unsupported: {}", msg),
            BbiError::Io(err)            => write!(f, "io error: {}", err),
        }
    }
}

/* -------------------------------------------------------------------------- */

impl std::error::Error for BbiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BbiError::Io(err) => Some(err),
            _                 => None,
        }
    }
}

/* -------------------------------------------------------------------------- */

impl From<io::Error> for BbiError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::UnexpectedEof => BbiError::UnexpectedEof,
            _                            => BbiError::Io(err),
        }
    }
}

/* -------------------------------------------------------------------------- */

impl From<String> for BbiError {
    fn from(msg: String) -> Self {
        BbiError::Inconsistent(msg)
    }
}

impl From<&str> for BbiError {
    fn from(msg: &str) -> Self {
        BbiError::Inconsistent(msg.to_string())
    }
}

/* -------------------------------------------------------------------------- */

impl From<BbiError> for io::Error {
    fn from(err: BbiError) -> Self {
        match err {
            BbiError::Io(err) => err,
            other              => io::Error::new(io::ErrorKind::Other, other.to_string()),
        }
    }
}

/* -------------------------------------------------------------------------- */

pub type Result<T> = std::result::Result<T, BbiError>;
