//! Content-Security-Policy editing for dev builds.

use indexmap::IndexMap;
use std::fmt;

/// Sources the dev server needs: its own origin on any local port.
pub const DEV_SCRIPT_SOURCES: &[&str] = &["'self'", "http://localhost:*", "http://127.0.0.1:*"];

/// Directive map preserving the order directives were first seen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentSecurityPolicy {
    directives: IndexMap<String, Vec<String>>,
}

impl ContentSecurityPolicy {
    /// Parse a policy string; `None` or blank yields an empty policy.
    pub fn parse(policy: Option<&str>) -> Self {
        let mut csp = Self::default();
        for directive in policy.unwrap_or_default().split(';') {
            let mut parts = directive.split_whitespace();
            if let Some(name) = parts.next() {
                csp.add(name, parts);
            }
        }
        csp
    }

    /// Add sources to a directive, skipping ones already present.
    pub fn add<I, S>(&mut self, directive: &str, sources: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let entry = self.directives.entry(directive.to_string()).or_default();
        for source in sources {
            let source = source.as_ref();
            if !entry.iter().any(|s| s == source) {
                entry.push(source.to_string());
            }
        }
    }

    pub fn sources(&self, directive: &str) -> Option<&[String]> {
        self.directives.get(directive).map(Vec::as_slice)
    }
}

impl fmt::Display for ContentSecurityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self
            .directives
            .iter()
            .map(|(name, sources)| {
                if sources.is_empty() {
                    name.clone()
                } else {
                    format!("{name} {}", sources.join(" "))
                }
            })
            .collect();
        f.write_str(&rendered.join("; "))
    }
}

/// Widen `policy` so extension pages may load scripts from the dev server.
pub fn dev_policy<'a>(policy: Option<&str>, script_hashes: impl IntoIterator<Item = &'a String>) -> String {
    let mut csp = ContentSecurityPolicy::parse(policy);
    csp.add("object-src", ["'self'"]);
    csp.add("script-src", DEV_SCRIPT_SOURCES);
    csp.add("script-src", script_hashes);
    csp.to_string()
}
