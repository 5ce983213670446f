//! Resolver: direct translation, then fallback chains, then payload
//! auto-detection.

use crate::detect::detect_format;
use crate::fallback::{FallbackRegistry, build_full_path};
use crate::registry::Registry;
use rosetta_core::{Format, Result, TranslateError};

/// What the resolver produced and how it got there.
#[derive(Debug, Clone)]
pub struct TranslationOutcome {
    pub payload: Vec<u8>,
    /// The hop list actually used.
    pub path: Vec<Format>,
    /// Filled when auto-detection ran and produced a format.
    pub detected: Option<Format>,
    pub direct_hit: bool,
    pub fallback_hit: bool,
    pub auto_detect_hit: bool,
    /// Every path that was attempted, in order.
    pub attempted: Vec<Vec<Format>>,
}

impl Registry {
    /// Translate with recovery: direct transform first, then the fallback
    /// chain, then auto-detection of the payload's real format.
    ///
    /// Auto-detect runs only after direct and fallback fail, so a
    /// correctly-tagged request is never re-routed.
    pub fn translate_request_with_recovery(
        &self,
        from: &Format,
        to: &Format,
        model: &str,
        payload: &[u8],
        stream: bool,
        fallback: &FallbackRegistry,
    ) -> Result<TranslationOutcome> {
        let mut attempted: Vec<Vec<Format>> = Vec::new();

        if from == to {
            return Ok(TranslationOutcome {
                payload: payload.to_vec(),
                path: vec![from.clone()],
                detected: None,
                direct_hit: true,
                fallback_hit: false,
                auto_detect_hit: false,
                attempted,
            });
        }

        // 1. Direct transform.
        let direct_path = vec![from.clone(), to.clone()];
        attempted.push(direct_path.clone());
        if self.has_request_translator(from, to) {
            let out = self.translate_request(from, to, model, payload, stream)?;
            return Ok(TranslationOutcome {
                payload: out,
                path: direct_path,
                detected: None,
                direct_hit: true,
                fallback_hit: false,
                auto_detect_hit: false,
                attempted,
            });
        }

        // 2. Fallback chain, if every hop is covered.
        if let Some(via) = fallback.get_chain(from, to) {
            let path = build_full_path(from, to, &via);
            attempted.push(path.clone());
            if self.chain_covered(&path) {
                let out = self.translate_request_via_chain(&path, model, payload, stream)?;
                return Ok(TranslationOutcome {
                    payload: out,
                    path,
                    detected: None,
                    direct_hit: false,
                    fallback_hit: true,
                    auto_detect_hit: false,
                    attempted,
                });
            }
        }

        // 3. Auto-detect the payload's real source format.
        let detected = detect_format(payload).map(|d| d.format);
        if let Some(detected_from) = detected.clone()
            && detected_from != *from
        {
            let detected_path = vec![detected_from.clone(), to.clone()];
            attempted.push(detected_path.clone());
            if self.has_request_translator(&detected_from, to) {
                let out = self.translate_request(&detected_from, to, model, payload, stream)?;
                return Ok(TranslationOutcome {
                    payload: out,
                    path: detected_path,
                    detected,
                    direct_hit: false,
                    fallback_hit: false,
                    auto_detect_hit: true,
                    attempted,
                });
            }
            if let Some(via) = fallback.get_chain(&detected_from, to) {
                let path = build_full_path(&detected_from, to, &via);
                attempted.push(path.clone());
                if self.chain_covered(&path) {
                    let out = self.translate_request_via_chain(&path, model, payload, stream)?;
                    return Ok(TranslationOutcome {
                        payload: out,
                        path,
                        detected,
                        direct_hit: false,
                        fallback_hit: false,
                        auto_detect_hit: true,
                        attempted,
                    });
                }
            }
        }

        Err(TranslateError::Unroutable {
            from: from.clone(),
            to: to.clone(),
            detected,
            attempted,
        })
    }

    fn chain_covered(&self, path: &[Format]) -> bool {
        path.windows(2)
            .all(|pair| self.has_request_translator(&pair[0], &pair[1]))
    }
}
