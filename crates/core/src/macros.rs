// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Declarative macros shared across the domain model.

/// Attach wire labels to a fieldless status enum.
///
/// Generates a `label()` accessor returning the lowercase label each
/// variant serializes to, and a `Display` impl that prints it. Keeping
/// both behind one macro means the log form and the serde form cannot
/// drift apart per enum.
///
/// ```ignore
/// crate::labels! {
///     MyStatus { Ready: "ready", Done: "done" }
/// }
/// ```
#[macro_export]
macro_rules! labels {
    ($name:ident { $( $variant:ident : $label:literal ),+ $(,)? }) => {
        impl $name {
            /// Lowercase label used on the wire and in logs.
            pub fn label(&self) -> &'static str {
                match self {
                    $( Self::$variant => $label, )+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.label())
            }
        }
    };
}
