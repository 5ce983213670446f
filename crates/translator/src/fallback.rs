//! Multi-hop chains bridging pairs that have no direct transform.

use crate::registry::Registry;
use rosetta_core::{Format, Result};
use std::collections::HashMap;
use std::sync::RwLock;

/// Store of (from, to) → ordered intermediate formats.
#[derive(Default)]
pub struct FallbackRegistry {
    chains: RwLock<HashMap<(Format, Format), Vec<Format>>>,
}

impl FallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_chain(&self, from: Format, to: Format, via: Vec<Format>) {
        self.chains
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert((from, to), via);
    }

    /// Returns an independent copy of the chain's intermediates.
    pub fn get_chain(&self, from: &Format, to: &Format) -> Option<Vec<Format>> {
        self.chains
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&(from.clone(), to.clone()))
            .cloned()
    }

    pub fn remove_chain(&self, from: &Format, to: &Format) {
        self.chains
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&(from.clone(), to.clone()));
    }

    pub fn clear(&self) {
        self.chains
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    pub fn len(&self) -> usize {
        self.chains.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Expand a chain into the full hop list `[from, ...via, to]`.
pub fn build_full_path(from: &Format, to: &Format, via: &[Format]) -> Vec<Format> {
    let mut path = Vec::with_capacity(via.len() + 2);
    path.push(from.clone());
    path.extend(via.iter().cloned());
    path.push(to.clone());
    path
}

impl Registry {
    /// Apply pairwise request translations along `path`. A path shorter
    /// than two hops returns the input unchanged. Hops are not validated
    /// here; that is the resolver's job.
    pub fn translate_request_via_chain(
        &self,
        path: &[Format],
        model: &str,
        payload: &[u8],
        stream: bool,
    ) -> Result<Vec<u8>> {
        if path.len() < 2 {
            return Ok(payload.to_vec());
        }
        let mut current = payload.to_vec();
        for pair in path.windows(2) {
            current = self.translate_request(&pair[0], &pair[1], model, &current, stream)?;
        }
        Ok(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_register_and_get_chain_copy() {
        let fallback = FallbackRegistry::new();
        fallback.register_chain(Format::Claude, Format::Gemini, vec![Format::OpenAI]);

        let mut chain = fallback.get_chain(&Format::Claude, &Format::Gemini).unwrap();
        chain.push(Format::Kiro);
        // Mutating the copy must not affect the stored chain.
        assert_eq!(
            fallback.get_chain(&Format::Claude, &Format::Gemini).unwrap(),
            vec![Format::OpenAI]
        );
    }

    #[test]
    fn test_build_full_path() {
        let path = build_full_path(
            &Format::Claude,
            &Format::Gemini,
            &[Format::OpenAI, Format::Codex],
        );
        assert_eq!(
            path,
            vec![Format::Claude, Format::OpenAI, Format::Codex, Format::Gemini]
        );
    }

    #[test]
    fn test_chain_composes_pairwise() {
        let registry = Registry::new();
        registry.register(
            Format::Claude,
            Format::OpenAI,
            Some(Arc::new(|_, p, _| {
                let mut out = p.to_vec();
                out.extend_from_slice(b"+a");
                Ok(out)
            })),
            None,
        );
        registry.register(
            Format::OpenAI,
            Format::Gemini,
            Some(Arc::new(|_, p, _| {
                let mut out = p.to_vec();
                out.extend_from_slice(b"+b");
                Ok(out)
            })),
            None,
        );

        let path = vec![Format::Claude, Format::OpenAI, Format::Gemini];
        let out = registry
            .translate_request_via_chain(&path, "m", b"x", false)
            .unwrap();
        assert_eq!(out, b"x+a+b");
    }

    #[test]
    fn test_short_path_returns_input() {
        let registry = Registry::new();
        let out = registry
            .translate_request_via_chain(&[Format::Claude], "m", b"x", false)
            .unwrap();
        assert_eq!(out, b"x");
    }

    #[test]
    fn test_remove_and_clear() {
        let fallback = FallbackRegistry::new();
        fallback.register_chain(Format::Claude, Format::Gemini, vec![Format::OpenAI]);
        fallback.register_chain(Format::Codex, Format::Claude, vec![Format::OpenAI]);
        assert_eq!(fallback.len(), 2);

        fallback.remove_chain(&Format::Claude, &Format::Gemini);
        assert!(fallback.get_chain(&Format::Claude, &Format::Gemini).is_none());

        fallback.clear();
        assert!(fallback.is_empty());
    }
}
