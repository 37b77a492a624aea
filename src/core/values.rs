//! Value providers for generated template bindings.
//!
//! Generated values are an explicit capability handed to evaluation, so a
//! run can regenerate them, reuse what the lock recorded, or derive them from
//! a seed.

use super::error::{Error, Result};
use super::types::{Generator, StateLock, ValuePolicy};
use std::collections::HashMap;

/// Identifies one generated value.
#[derive(Debug, Clone, Copy)]
pub struct ValueKey<'a> {
    pub machine: &'a str,
    pub resource: &'a str,
    pub name: &'a str,
}

/// Supplies values for `{ generate: ... }` bindings.
pub trait ValueProvider {
    fn generate(&mut self, key: &ValueKey<'_>, generator: &Generator) -> String;
}

/// Fresh random value on every call.
#[derive(Debug, Default)]
pub struct RandomValues;

impl ValueProvider for RandomValues {
    fn generate(&mut self, _key: &ValueKey<'_>, generator: &Generator) -> String {
        match generator {
            Generator::Uuid => uuid::Uuid::new_v4().to_string(),
        }
    }
}

/// Deterministic values derived from BLAKE3(seed, machine, resource, name).
#[derive(Debug)]
pub struct SeededValues {
    seed: String,
}

impl SeededValues {
    pub fn new(seed: impl Into<String>) -> Self {
        Self { seed: seed.into() }
    }
}

impl ValueProvider for SeededValues {
    fn generate(&mut self, key: &ValueKey<'_>, generator: &Generator) -> String {
        let kind = generator.to_string();
        let mut hasher = blake3::Hasher::new();
        for part in [
            self.seed.as_str(),
            key.machine,
            key.resource,
            key.name,
            kind.as_str(),
        ] {
            hasher.update(part.as_bytes());
            hasher.update(b"\0");
        }
        let digest = hasher.finalize();
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&digest.as_bytes()[..16]);
        match generator {
            Generator::Uuid => uuid::Builder::from_random_bytes(bytes)
                .into_uuid()
                .to_string(),
        }
    }
}

/// Reuses values recorded by a previous apply; falls back for new keys.
#[derive(Debug)]
pub struct StableValues<P> {
    recorded: HashMap<String, String>,
    fallback: P,
}

impl<P: ValueProvider> StableValues<P> {
    pub fn new(fallback: P) -> Self {
        Self {
            recorded: HashMap::new(),
            fallback,
        }
    }

    /// Seed the cache from a machine's lock.
    pub fn from_lock(lock: Option<&StateLock>, fallback: P) -> Self {
        let mut stable = Self::new(fallback);
        if let Some(lock) = lock {
            for (resource_id, rl) in &lock.resources {
                for (name, value) in &rl.generated {
                    stable
                        .recorded
                        .insert(format!("{}\0{}", resource_id, name), value.clone());
                }
            }
        }
        stable
    }
}

impl<P: ValueProvider> ValueProvider for StableValues<P> {
    fn generate(&mut self, key: &ValueKey<'_>, generator: &Generator) -> String {
        let cache_key = format!("{}\0{}", key.resource, key.name);
        if let Some(v) = self.recorded.get(&cache_key) {
            return v.clone();
        }
        let v = self.fallback.generate(key, generator);
        self.recorded.insert(cache_key, v.clone());
        v
    }
}

/// Build the provider a policy asks for.
pub fn provider_for(
    policy: &ValuePolicy,
    seed: Option<&str>,
    lock: Option<&StateLock>,
) -> Result<Box<dyn ValueProvider>> {
    match policy {
        ValuePolicy::Regenerate => Ok(Box::new(RandomValues)),
        ValuePolicy::Stable => Ok(Box::new(StableValues::from_lock(lock, RandomValues))),
        ValuePolicy::Seeded => {
            let seed = seed.ok_or_else(|| {
                Error::Config("generated_values: seeded requires a seed".to_string())
            })?;
            Ok(Box::new(SeededValues::new(seed)))
        }
    }
}

/// True if `s` is a canonical hyphenated lowercase UUID.
pub fn is_uuid(s: &str) -> bool {
    s.len() == 36 && uuid::Uuid::parse_str(s).is_ok() && s == s.to_lowercase()
}
