// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Bootstrap stub of a bundle.
//!
//! A bundle is a POSIX shell script with a tar payload glued to its end. The
//! script maps the payload onto disk once, keyed by the signature of the
//! payload, and then hands off to the entry point inside of it. The payload
//! starts at a fixed line of the bundle. The script exits before the shell
//! ever reaches that line.
//!
//! Builds made from an untagged commit carry a warning time. Once that time
//! passes, every run of the bundle warns that the build is stale.

use sha2::{Digest, Sha256};

/// Seconds after build date until an untagged build is considered stale.
pub const STALE_AFTER_SECS: i64 = 60 * 86400;

const TEMPLATE: &str = r#"#!/bin/sh
# @ALIAS@ @VERSION@ (@RELEASE_DATE@)
set -e
SELF="$0"
SIGNATURE=@SIGNATURE@
PAYLOAD_LINE=@PAYLOAD_LINE@
WARNING_TIME=@WARNING_TIME@
if [ -n "$WARNING_TIME" ] && [ "$(date +%s)" -gt "$WARNING_TIME" ]; then
    echo "Warning: this @ALIAS@ build is over 60 days old, consider updating it." >&2
fi
MAP="${TMPDIR:-/tmp}/@ALIAS@-$(echo "$SIGNATURE" | cut -c1-16)"
if [ ! -d "$MAP" ]; then
    if command -v sha256sum >/dev/null 2>&1; then
        ACTUAL=$(tail -n +"$PAYLOAD_LINE" "$SELF" | sha256sum | cut -d' ' -f1)
        if [ "$ACTUAL" != "$SIGNATURE" ]; then
            echo "@ALIAS@: signature mismatch, bundle is corrupt" >&2
            exit 1
        fi
    fi
    STAGE=$(mktemp -d "${TMPDIR:-/tmp}/@ALIAS@.XXXXXX")
    tail -n +"$PAYLOAD_LINE" "$SELF" | tar -x@TAR_FLAGS@f - -C "$STAGE"
    mv "$STAGE" "$MAP" 2>/dev/null || rm -rf "$STAGE"
fi
exec @INTERPRETER@ "$MAP/@ENTRY@" "$@"
exit 1
"#;

/// Parameters of bootstrap stub.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stub {
    /// Name of bundle.
    pub alias: String,

    /// Version label of bundle.
    pub version: String,

    /// Release date label of bundle.
    pub release_date: String,

    /// Program that runs the entry point.
    pub interpreter: String,

    /// Path to entry point inside of payload.
    pub entry: String,

    /// Whether payload is gzip-compressed.
    pub compressed: bool,

    /// Unix time after which the stale build warning shows.
    pub warning_time: Option<i64>,
}

impl Stub {
    /// Render stub for payload with target signature.
    pub fn render(&self, signature: &str) -> String {
        let stub = self.fill(signature, 0);
        let payload_line = stub.lines().count() + 1;
        self.fill(signature, payload_line)
    }

    /// Glue rendered stub and signed payload together.
    pub fn bundle(&self, payload: &[u8]) -> Vec<u8> {
        let signature = sign(payload);
        let mut bundle = self.render(signature.as_str()).into_bytes();
        bundle.extend_from_slice(payload);
        bundle
    }

    fn fill(&self, signature: &str, payload_line: usize) -> String {
        TEMPLATE
            .replace("@ALIAS@", self.alias.as_str())
            .replace("@VERSION@", self.version.as_str())
            .replace("@RELEASE_DATE@", self.release_date.as_str())
            .replace("@SIGNATURE@", signature)
            .replace("@PAYLOAD_LINE@", payload_line.to_string().as_str())
            .replace(
                "@WARNING_TIME@",
                self.warning_time
                    .map(|time| time.to_string())
                    .unwrap_or_default()
                    .as_str(),
            )
            .replace("@TAR_FLAGS@", if self.compressed { "z" } else { "" })
            .replace("@INTERPRETER@", self.interpreter.as_str())
            .replace("@ENTRY@", self.entry.as_str())
    }
}

/// Hex-encoded SHA-256 digest of payload.
pub fn sign(payload: &[u8]) -> String {
    format!("{:x}", Sha256::digest(payload))
}

/// Split bundle into stub and payload.
///
/// Returns `None` if bundle does not start with a stub.
pub fn split(bundle: &[u8]) -> Option<(&[u8], &[u8])> {
    let marker = b"\nPAYLOAD_LINE=";
    let at = bundle
        .windows(marker.len())
        .position(|window| window == marker)?
        + marker.len();
    let digits = bundle[at..]
        .iter()
        .take_while(|byte| byte.is_ascii_digit())
        .count();
    let payload_line: usize = std::str::from_utf8(&bundle[at..at + digits])
        .ok()?
        .parse()
        .ok()?;

    let mut offset = 0;
    for _ in 1..payload_line {
        offset += bundle[offset..].iter().position(|byte| *byte == b'\n')? + 1;
    }

    Some(bundle.split_at(offset))
}
