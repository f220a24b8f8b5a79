//! # Fusão de Posições
//!
//! Concatena N sub-streams num único fluxo global, preservando a ordem interna de cada
//! um e inserindo um **gap** de posições entre streams consecutivos que produziram
//! algum token.
//!
//! ```text
//! stream A:  foo(1) bar(2) foo(3) bar(4)
//! stream B:  foo(1) bar(2)                       gap = 1000
//!
//! saída:     foo bar foo bar  foo       bar
//! posição:   1   2   3   4    1005      1006
//! incr:      1   1   1   1    1001      1
//! ```
//!
//! Streams ausentes ou vazios não contribuem com termos nem com gap.

use std::cmp::Ordering;

use crate::analysis::TokenStream;
use crate::attributes::{AttributeSource, OffsetAttribute, PositionIncrementAttribute};
use crate::error::Result;

/// Posição reportada por um stream esgotado.
pub const EXHAUSTED: u32 = u32::MAX;

/// Envolve um stream e acumula a posição absoluta do token atual.
pub struct PositionedTokenStream {
    input: Box<dyn TokenStream>,
    position: u32,
}

impl PositionedTokenStream {
    pub fn new(mut input: Box<dyn TokenStream>) -> Self {
        let attrs = input.attributes_mut();
        attrs.add_attribute::<OffsetAttribute>();
        attrs.add_attribute::<PositionIncrementAttribute>();
        Self { input, position: 0 }
    }

    /// Posição do token atual, ou [`EXHAUSTED`] depois do último.
    pub fn position(&self) -> u32 {
        self.position
    }

    pub fn is_exhausted(&self) -> bool {
        self.position == EXHAUSTED
    }

    fn offsets(&self) -> (usize, usize) {
        self.input
            .attributes()
            .get::<OffsetAttribute>()
            .map(|o| (o.start_offset(), o.end_offset()))
            .unwrap_or_default()
    }

    /// Ordem de leitura entre dois streams: offset inicial, offset final, posição.
    pub fn reading_order(&self, other: &PositionedTokenStream) -> Ordering {
        let (start, end) = self.offsets();
        let (other_start, other_end) = other.offsets();
        start
            .cmp(&other_start)
            .then(end.cmp(&other_end))
            .then(self.position.cmp(&other.position))
    }
}

impl TokenStream for PositionedTokenStream {
    fn attributes(&self) -> &AttributeSource {
        self.input.attributes()
    }

    fn attributes_mut(&mut self) -> &mut AttributeSource {
        self.input.attributes_mut()
    }

    fn reset(&mut self) -> Result<()> {
        self.input.reset()?;
        self.position = 0;
        Ok(())
    }

    fn advance(&mut self) -> Result<bool> {
        if !self.input.advance()? {
            self.position = EXHAUSTED;
            return Ok(false);
        }
        let increment = self
            .input
            .attributes()
            .get::<PositionIncrementAttribute>()
            .map(|p| p.position_increment())
            .unwrap_or(1);
        self.position = self.position.saturating_add(increment);
        Ok(true)
    }

    fn end(&mut self) -> Result<()> {
        self.input.end()?;
        self.position = 0;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.input.close()?;
        self.position = 0;
        Ok(())
    }
}

/// O multiplexador: um stream cujo conteúdo é a concatenação dos sub-streams.
///
/// Os sub-streams são consumidos em ordem. O incremento de posição de cada token de
/// saída é recalculado para que a posição global nunca diminua e para que a troca de
/// stream salte pelo menos `gap` posições.
pub struct PositionedTokenStreams {
    attrs: AttributeSource,
    streams: Vec<Option<PositionedTokenStream>>,
    current: usize,
    cur_stream_position: u64,
    total_stream_position: u64,
    last_position: u64,
    gap: u32,
}

impl PositionedTokenStreams {
    /// `gap` negativo é tratado como 0.
    pub fn new(gap: i64) -> Self {
        let mut attrs = AttributeSource::new();
        attrs.add_attribute::<PositionIncrementAttribute>();
        Self {
            attrs,
            streams: Vec::new(),
            current: 0,
            cur_stream_position: 0,
            total_stream_position: 0,
            last_position: 0,
            gap: gap.clamp(0, u32::MAX as i64) as u32,
        }
    }

    pub fn gap(&self) -> u32 {
        self.gap
    }

    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    /// Instala os sub-streams desta requisição. Slots `None` são pulados.
    ///
    /// O bag de saída passa a conter a união dos tipos de atributo de todos os
    /// sub-streams.
    pub fn set_token_streams(&mut self, streams: Vec<Option<Box<dyn TokenStream>>>) {
        self.streams = streams
            .into_iter()
            .map(|slot| slot.map(PositionedTokenStream::new))
            .collect();
        for stream in self.streams.iter().flatten() {
            for kind in stream.attributes().kinds() {
                self.attrs.add_kind(*kind);
            }
        }
        self.reset_counters();
    }

    fn reset_counters(&mut self) {
        self.current = 0;
        self.cur_stream_position = 0;
        self.total_stream_position = 0;
        self.last_position = 0;
    }

    /// Fecha a faixa de posições do stream atual e passa ao próximo.
    fn finish_current(&mut self) {
        if self.cur_stream_position > 0 {
            self.total_stream_position += self.cur_stream_position + u64::from(self.gap);
        }
        self.cur_stream_position = 0;
        self.current += 1;
    }

    fn last_present(&self) -> Option<&PositionedTokenStream> {
        self.streams.iter().rev().flatten().next()
    }
}

impl TokenStream for PositionedTokenStreams {
    fn attributes(&self) -> &AttributeSource {
        &self.attrs
    }

    fn attributes_mut(&mut self) -> &mut AttributeSource {
        &mut self.attrs
    }

    fn reset(&mut self) -> Result<()> {
        for stream in self.streams.iter_mut().flatten() {
            stream.reset()?;
        }
        self.reset_counters();
        Ok(())
    }

    fn advance(&mut self) -> Result<bool> {
        self.attrs.clear_attributes();
        loop {
            let stream = match self.streams.get_mut(self.current) {
                None => return Ok(false),
                Some(Some(stream)) => stream,
                Some(None) => {
                    self.finish_current();
                    continue;
                }
            };
            if !stream.advance()? {
                self.finish_current();
                continue;
            }

            self.cur_stream_position = u64::from(stream.position());
            let expected = self.total_stream_position + self.cur_stream_position;
            self.attrs.restore_state(&stream.attributes().capture_state())?;

            let increment = expected.saturating_sub(self.last_position);
            let increment = u32::try_from(increment).unwrap_or(u32::MAX);
            self.attrs
                .add_attribute::<PositionIncrementAttribute>()
                .set_position_increment(increment);
            self.last_position += u64::from(increment);
            return Ok(true);
        }
    }

    fn end(&mut self) -> Result<()> {
        self.attrs.clear_attributes();
        for stream in self.streams.iter_mut().flatten() {
            stream.end()?;
        }
        self.reset_counters();
        if let Some(last) = self.last_present() {
            let state = last.attributes().capture_state();
            self.attrs.restore_state(&state)?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        for stream in self.streams.iter_mut().flatten() {
            stream.close()?;
        }
        self.reset_counters();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::drain_tokens;
    use crate::attributes::CharTermAttribute;
    use proptest::prelude::*;

    /// Stream de teste com tokens fixos `(termo, início, fim, incremento)`.
    struct FixedStream {
        attrs: AttributeSource,
        tokens: Vec<(String, usize, usize, u32)>,
        next: usize,
        final_offset: usize,
    }

    impl FixedStream {
        fn new(tokens: &[(&str, usize, usize, u32)]) -> Self {
            let mut attrs = AttributeSource::new();
            attrs.add_attribute::<CharTermAttribute>();
            let final_offset = tokens.last().map(|t| t.2 + 1).unwrap_or(0);
            Self {
                attrs,
                tokens: tokens
                    .iter()
                    .map(|&(t, s, e, i)| (t.to_string(), s, e, i))
                    .collect(),
                next: 0,
                final_offset,
            }
        }

        fn words(words: &[&str]) -> Box<dyn TokenStream> {
            let mut offset = 0;
            let tokens: Vec<(&str, usize, usize, u32)> = words
                .iter()
                .map(|w| {
                    let token = (*w, offset, offset + w.len(), 1);
                    offset += w.len() + 1;
                    token
                })
                .collect();
            Box::new(FixedStream::new(&tokens))
        }
    }

    impl TokenStream for FixedStream {
        fn attributes(&self) -> &AttributeSource {
            &self.attrs
        }

        fn attributes_mut(&mut self) -> &mut AttributeSource {
            &mut self.attrs
        }

        fn reset(&mut self) -> Result<()> {
            self.next = 0;
            Ok(())
        }

        fn advance(&mut self) -> Result<bool> {
            self.attrs.clear_attributes();
            let Some((term, start, end, incr)) = self.tokens.get(self.next).cloned() else {
                return Ok(false);
            };
            self.next += 1;
            self.attrs.add_attribute::<CharTermAttribute>().set(&term);
            self.attrs.add_attribute::<OffsetAttribute>().set_offset(start, end);
            self.attrs
                .add_attribute::<PositionIncrementAttribute>()
                .set_position_increment(incr);
            Ok(true)
        }

        fn end(&mut self) -> Result<()> {
            self.attrs.clear_attributes();
            let offset = self.final_offset;
            self.attrs.add_attribute::<OffsetAttribute>().set_offset(offset, offset);
            self.attrs
                .add_attribute::<PositionIncrementAttribute>()
                .set_position_increment(0);
            Ok(())
        }

        fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    fn merged(gap: i64, streams: Vec<Option<Box<dyn TokenStream>>>) -> PositionedTokenStreams {
        let mut multiplexer = PositionedTokenStreams::new(gap);
        multiplexer.set_token_streams(streams);
        multiplexer
    }

    fn terms_and_increments(stream: &mut dyn TokenStream) -> Vec<(String, u32)> {
        drain_tokens(stream)
            .unwrap()
            .into_iter()
            .map(|t| (t.term, t.position_increment))
            .collect()
    }

    #[test]
    fn test_positioned_stream_tracks_position() {
        let mut stream = PositionedTokenStream::new(Box::new(FixedStream::new(&[
            ("a", 0, 1, 1),
            ("b", 2, 3, 0),
            ("c", 4, 5, 3),
        ])));
        stream.reset().unwrap();
        let mut positions = Vec::new();
        while stream.advance().unwrap() {
            positions.push(stream.position());
        }
        assert_eq!(positions, vec![1, 1, 4]);
        assert!(stream.is_exhausted());
        stream.end().unwrap();
        assert_eq!(stream.position(), 0);
    }

    #[test]
    fn test_reading_order() {
        let mut first = PositionedTokenStream::new(FixedStream::words(&["aa", "b"]));
        let mut second = PositionedTokenStream::new(FixedStream::words(&["aa"]));
        first.reset().unwrap();
        second.reset().unwrap();
        first.advance().unwrap();
        second.advance().unwrap();
        assert_eq!(first.reading_order(&second), Ordering::Equal);
        first.advance().unwrap();
        assert_eq!(first.reading_order(&second), Ordering::Greater);
        assert_eq!(second.reading_order(&first), Ordering::Less);
    }

    #[test]
    fn test_concatenation_order_and_gap() {
        let mut multiplexer = merged(
            1000,
            vec![
                Some(FixedStream::words(&["foo", "bar"])),
                Some(FixedStream::words(&["baz", "qux"])),
            ],
        );
        assert_eq!(
            terms_and_increments(&mut multiplexer),
            vec![
                ("foo".to_string(), 1),
                ("bar".to_string(), 1),
                ("baz".to_string(), 1001),
                ("qux".to_string(), 1),
            ]
        );
    }

    #[test]
    fn test_offsets_pass_through() {
        let mut multiplexer = merged(
            10,
            vec![
                Some(FixedStream::words(&["foo", "bar"])),
                Some(FixedStream::words(&["foo", "bar"])),
            ],
        );
        let tokens = drain_tokens(&mut multiplexer).unwrap();
        let offsets: Vec<(usize, usize)> = tokens.iter().map(|t| (t.start, t.end)).collect();
        assert_eq!(offsets, vec![(0, 3), (4, 7), (0, 3), (4, 7)]);
        let positions: Vec<u32> = tokens.iter().map(|t| t.position).collect();
        assert_eq!(positions, vec![0, 1, 12, 13]);
    }

    #[test]
    fn test_empty_and_absent_streams_add_no_gap() {
        let mut multiplexer = merged(
            100,
            vec![
                None,
                Some(FixedStream::words(&[])),
                Some(FixedStream::words(&["a"])),
                Some(FixedStream::words(&[])),
                None,
                Some(FixedStream::words(&[])),
                Some(FixedStream::words(&["b"])),
                Some(FixedStream::words(&[])),
            ],
        );
        assert_eq!(
            terms_and_increments(&mut multiplexer),
            vec![("a".to_string(), 1), ("b".to_string(), 101)]
        );
    }

    #[test]
    fn test_zero_increment_tokens_are_kept() {
        let mut multiplexer = merged(
            5,
            vec![
                Some(Box::new(FixedStream::new(&[("a", 0, 1, 1), ("a2", 0, 1, 0)]))
                    as Box<dyn TokenStream>),
                Some(FixedStream::words(&["b"])),
            ],
        );
        assert_eq!(
            terms_and_increments(&mut multiplexer),
            vec![
                ("a".to_string(), 1),
                ("a2".to_string(), 0),
                ("b".to_string(), 6),
            ]
        );
    }

    #[test]
    fn test_negative_gap_is_clamped() {
        let mut multiplexer = merged(
            -7,
            vec![
                Some(FixedStream::words(&["a"])),
                Some(FixedStream::words(&["b"])),
            ],
        );
        assert_eq!(multiplexer.gap(), 0);
        assert_eq!(
            terms_and_increments(&mut multiplexer),
            vec![("a".to_string(), 1), ("b".to_string(), 1)]
        );
    }

    #[test]
    fn test_no_streams() {
        let mut multiplexer = merged(1000, Vec::new());
        assert!(drain_tokens(&mut multiplexer).unwrap().is_empty());
        let mut multiplexer = merged(1000, vec![None, None]);
        assert!(drain_tokens(&mut multiplexer).unwrap().is_empty());
    }

    #[test]
    fn test_end_restores_last_present_stream() {
        let mut multiplexer = merged(
            1000,
            vec![
                Some(FixedStream::words(&["foo"])),
                Some(FixedStream::words(&["foo", "bar"])),
                None,
            ],
        );
        multiplexer.reset().unwrap();
        while multiplexer.advance().unwrap() {}
        multiplexer.end().unwrap();
        let offset = multiplexer.attributes().get::<OffsetAttribute>().copied().unwrap();
        assert_eq!((offset.start_offset(), offset.end_offset()), (8, 8));
        let incr = multiplexer
            .attributes()
            .get::<PositionIncrementAttribute>()
            .unwrap()
            .position_increment();
        assert_eq!(incr, 0);
    }

    #[test]
    fn test_lifecycle_is_idempotent_and_repeatable() {
        let mut multiplexer = merged(
            3,
            vec![
                Some(FixedStream::words(&["x", "y"])),
                Some(FixedStream::words(&["z"])),
            ],
        );
        let first = terms_and_increments(&mut multiplexer);
        multiplexer.reset().unwrap();
        multiplexer.reset().unwrap();
        let second = terms_and_increments(&mut multiplexer);
        assert_eq!(first, second);
        multiplexer.end().unwrap();
        multiplexer.end().unwrap();
        multiplexer.close().unwrap();
        multiplexer.close().unwrap();
    }

    #[test]
    fn test_output_bag_is_union_of_sub_streams() {
        let multiplexer = merged(0, vec![Some(FixedStream::words(&["a"]))]);
        let attrs = multiplexer.attributes();
        assert!(attrs.has::<CharTermAttribute>());
        assert!(attrs.has::<OffsetAttribute>());
        assert!(attrs.has::<PositionIncrementAttribute>());
    }

    proptest! {
        #[test]
        fn prop_positions_monotone_with_gap_jumps(
            lengths in proptest::collection::vec(0usize..6, 0..6),
            gap in 0i64..50,
        ) {
            let streams: Vec<Option<Box<dyn TokenStream>>> = lengths
                .iter()
                .enumerate()
                .map(|(i, &n)| {
                    let words: Vec<String> = (0..n).map(|j| format!("s{i}t{j}")).collect();
                    let refs: Vec<&str> = words.iter().map(String::as_str).collect();
                    Some(FixedStream::words(&refs))
                })
                .collect();
            let mut multiplexer = merged(gap, streams);
            let tokens = drain_tokens(&mut multiplexer).unwrap();

            let expected: Vec<String> = lengths
                .iter()
                .enumerate()
                .flat_map(|(i, &n)| (0..n).map(move |j| format!("s{i}t{j}")))
                .collect();
            let terms: Vec<String> = tokens.iter().map(|t| t.term.clone()).collect();
            prop_assert_eq!(terms, expected);

            for pair in tokens.windows(2) {
                prop_assert!(pair[1].position >= pair[0].position);
                let stream_changed = pair[0].term.split('t').next() != pair[1].term.split('t').next();
                if stream_changed {
                    prop_assert_eq!(u64::from(pair[1].position_increment), gap as u64 + 1);
                } else {
                    prop_assert_eq!(pair[1].position_increment, 1);
                }
            }
        }
    }
}
