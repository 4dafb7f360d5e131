// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-eggbot project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Utility functions shared across the application.

/// Whether a user-supplied file name is safe to create inside a managed
/// directory: ASCII letters, digits, underscore, dash, and dot only
/// (`^[A-Za-z0-9_\-\.]+$`). Path separators are rejected outright.
pub fn is_safe_filename(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}
