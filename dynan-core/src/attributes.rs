//! # Atributos de Token e o "Bag" Tipado
//!
//! Um token não é um struct fixo: ele é o conjunto dos **valores atuais** dos atributos
//! registrados num [`AttributeSource`]. Cada stream declara, na construção, quais tipos
//! de atributo expõe (termo, offsets, incremento de posição, tipo léxico...), antes de
//! qualquer token fluir.
//!
//! ## Snapshots
//!
//! [`AttributeSource::capture_state`] tira uma "foto" imutável de todos os valores.
//! [`AttributeSource::restore_state`] copia essa foto para outro bag, que **precisa já
//! expor** os mesmos tipos. É assim que o multiplexador copia o token de um sub-stream
//! para o seu próprio bag de saída.
//!
//! ## Exemplo
//!
//! ```rust
//! use dynan_core::attributes::{AttributeSource, CharTermAttribute, OffsetAttribute};
//!
//! let mut origem = AttributeSource::new();
//! origem.add_attribute::<CharTermAttribute>().set("foo");
//! origem.add_attribute::<OffsetAttribute>().set_offset(0, 3);
//!
//! let mut destino = AttributeSource::new();
//! for kind in origem.kinds() {
//!     destino.add_kind(*kind);
//! }
//! destino.restore_state(&origem.capture_state()).unwrap();
//! assert_eq!(destino.get::<CharTermAttribute>().unwrap().as_str(), "foo");
//! ```

use std::any::{Any, TypeId};
use std::fmt::Debug;

use crate::error::{AnalysisError, Result};

/// Um atributo de token, identificado pelo seu tipo Rust.
pub trait Attribute: Any + Debug + Send + Sync {
    /// Volta ao valor padrão (chamado antes de cada novo token).
    fn clear(&mut self);
    fn clone_box(&self) -> Box<dyn Attribute>;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl Clone for Box<dyn Attribute> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Implementa o boilerplate de [`Attribute`] para tipos `Clone + Default`.
///
/// `clear` restaura o `Default` do tipo.
#[macro_export]
macro_rules! impl_attribute {
    ($ty:ty) => {
        impl $crate::attributes::Attribute for $ty {
            fn clear(&mut self) {
                *self = <$ty as Default>::default();
            }

            fn clone_box(&self) -> Box<dyn $crate::attributes::Attribute> {
                Box::new(self.clone())
            }

            fn as_any(&self) -> &dyn std::any::Any {
                self
            }

            fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
                self
            }
        }
    };
}

/// Descritor de um tipo de atributo: permite registrar o tipo num bag
/// sem conhecê-lo estaticamente (necessário para a união de tipos do multiplexador).
#[derive(Debug, Clone, Copy)]
pub struct AttributeKind {
    type_id: TypeId,
    name: &'static str,
    make: fn() -> Box<dyn Attribute>,
}

impl AttributeKind {
    pub fn of<A: Attribute + Default>() -> Self {
        Self {
            type_id: TypeId::of::<A>(),
            name: std::any::type_name::<A>(),
            make: make_default::<A>,
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

fn make_default<A: Attribute + Default>() -> Box<dyn Attribute> {
    Box::new(A::default())
}

impl PartialEq for AttributeKind {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for AttributeKind {}

#[derive(Debug, Clone)]
struct Slot {
    kind: AttributeKind,
    value: Box<dyn Attribute>,
}

/// Captura imutável dos valores de todos os atributos de um bag.
#[derive(Debug, Clone, Default)]
pub struct AttributeState {
    values: Vec<(AttributeKind, Box<dyn Attribute>)>,
}

impl AttributeState {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// O bag de atributos de um stream, indexado por tipo e em ordem de registro.
#[derive(Debug, Clone, Default)]
pub struct AttributeSource {
    slots: Vec<Slot>,
}

impl AttributeSource {
    pub fn new() -> Self {
        Self { slots: Vec::new() }
    }

    fn position(&self, type_id: TypeId) -> Option<usize> {
        self.slots.iter().position(|s| s.kind.type_id == type_id)
    }

    /// Registra o tipo descrito por `kind` (idempotente) e devolve o índice do slot.
    pub fn add_kind(&mut self, kind: AttributeKind) -> usize {
        if let Some(idx) = self.position(kind.type_id) {
            return idx;
        }
        self.slots.push(Slot {
            kind,
            value: (kind.make)(),
        });
        self.slots.len() - 1
    }

    /// Registra `A` se ainda não existir e devolve o valor atual para escrita.
    pub fn add_attribute<A: Attribute + Default>(&mut self) -> &mut A {
        let idx = self.add_kind(AttributeKind::of::<A>());
        match self.slots[idx].value.as_any_mut().downcast_mut::<A>() {
            Some(attr) => attr,
            None => unreachable!("attribute slot keyed by TypeId holds another type"),
        }
    }

    pub fn get<A: Attribute>(&self) -> Option<&A> {
        let idx = self.position(TypeId::of::<A>())?;
        self.slots[idx].value.as_any().downcast_ref::<A>()
    }

    pub fn get_mut<A: Attribute>(&mut self) -> Option<&mut A> {
        let idx = self.position(TypeId::of::<A>())?;
        self.slots[idx].value.as_any_mut().downcast_mut::<A>()
    }

    pub fn has<A: Attribute>(&self) -> bool {
        self.position(TypeId::of::<A>()).is_some()
    }

    /// Tipos registrados, em ordem de registro.
    pub fn kinds(&self) -> impl Iterator<Item = &AttributeKind> {
        self.slots.iter().map(|s| &s.kind)
    }

    pub fn clear_attributes(&mut self) {
        for slot in &mut self.slots {
            slot.value.clear();
        }
    }

    pub fn capture_state(&self) -> AttributeState {
        AttributeState {
            values: self
                .slots
                .iter()
                .map(|s| (s.kind, s.value.clone_box()))
                .collect(),
        }
    }

    /// Copia um snapshot para este bag.
    ///
    /// Todos os tipos do snapshot precisam estar registrados aqui; caso contrário
    /// retorna [`AnalysisError::MissingAttribute`] sem alterar nenhum valor.
    pub fn restore_state(&mut self, state: &AttributeState) -> Result<()> {
        let mut targets = Vec::with_capacity(state.values.len());
        for (kind, _) in &state.values {
            match self.position(kind.type_id) {
                Some(idx) => targets.push(idx),
                None => return Err(AnalysisError::MissingAttribute(kind.name)),
            }
        }
        for (idx, (_, value)) in targets.into_iter().zip(&state.values) {
            self.slots[idx].value = value.clone_box();
        }
        Ok(())
    }
}

// =====================================================================
// ATRIBUTOS PADRÃO
// =====================================================================

/// Texto do termo.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CharTermAttribute {
    term: String,
}

impl CharTermAttribute {
    pub fn set(&mut self, term: &str) {
        self.term.clear();
        self.term.push_str(term);
    }

    pub fn as_str(&self) -> &str {
        &self.term
    }
}

impl_attribute!(CharTermAttribute);

/// Offsets (em bytes) do token no texto que o analisador recebeu. `end` é exclusivo.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OffsetAttribute {
    start: usize,
    end: usize,
}

impl OffsetAttribute {
    pub fn set_offset(&mut self, start: usize, end: usize) {
        self.start = start;
        self.end = end;
    }

    pub fn start_offset(&self) -> usize {
        self.start
    }

    pub fn end_offset(&self) -> usize {
        self.end
    }
}

impl_attribute!(OffsetAttribute);

/// Distância, em posições, para o token anterior. O padrão é 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionIncrementAttribute {
    increment: u32,
}

impl Default for PositionIncrementAttribute {
    fn default() -> Self {
        Self { increment: 1 }
    }
}

impl PositionIncrementAttribute {
    pub fn set_position_increment(&mut self, increment: u32) {
        self.increment = increment;
    }

    pub fn position_increment(&self) -> u32 {
        self.increment
    }
}

impl_attribute!(PositionIncrementAttribute);

/// Tipo léxico do token (ex: `<ALPHANUM>`, `<NUM>`, `word`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeAttribute {
    kind: String,
}

impl Default for TypeAttribute {
    fn default() -> Self {
        Self {
            kind: "word".to_string(),
        }
    }
}

impl TypeAttribute {
    pub fn set_type(&mut self, kind: &str) {
        self.kind.clear();
        self.kind.push_str(kind);
    }

    pub fn token_type(&self) -> &str {
        &self.kind
    }
}

impl_attribute!(TypeAttribute);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_attribute_is_idempotent() {
        let mut attrs = AttributeSource::new();
        attrs.add_attribute::<CharTermAttribute>().set("foo");
        attrs.add_attribute::<CharTermAttribute>();
        assert_eq!(attrs.kinds().count(), 1);
        assert_eq!(attrs.get::<CharTermAttribute>().unwrap().as_str(), "foo");
    }

    #[test]
    fn test_clear_restores_defaults() {
        let mut attrs = AttributeSource::new();
        attrs.add_attribute::<PositionIncrementAttribute>().set_position_increment(7);
        attrs.add_attribute::<TypeAttribute>().set_type("<NUM>");
        attrs.clear_attributes();
        assert_eq!(attrs.get::<PositionIncrementAttribute>().unwrap().position_increment(), 1);
        assert_eq!(attrs.get::<TypeAttribute>().unwrap().token_type(), "word");
    }

    #[test]
    fn test_restore_into_bag_with_same_types() {
        let mut src = AttributeSource::new();
        src.add_attribute::<CharTermAttribute>().set("bar");
        src.add_attribute::<OffsetAttribute>().set_offset(4, 7);
        let state = src.capture_state();

        let mut dst = AttributeSource::new();
        dst.add_attribute::<OffsetAttribute>();
        dst.add_attribute::<CharTermAttribute>();
        dst.add_attribute::<PositionIncrementAttribute>().set_position_increment(3);
        dst.restore_state(&state).unwrap();

        assert_eq!(dst.get::<CharTermAttribute>().unwrap().as_str(), "bar");
        assert_eq!(dst.get::<OffsetAttribute>().unwrap().end_offset(), 7);
        // Tipos fora do snapshot ficam intactos
        assert_eq!(dst.get::<PositionIncrementAttribute>().unwrap().position_increment(), 3);
    }

    #[test]
    fn test_restore_missing_type_fails_without_partial_write() {
        let mut src = AttributeSource::new();
        src.add_attribute::<CharTermAttribute>().set("x");
        src.add_attribute::<TypeAttribute>();

        let mut dst = AttributeSource::new();
        dst.add_attribute::<CharTermAttribute>().set("old");

        let err = dst.restore_state(&src.capture_state()).unwrap_err();
        assert!(matches!(err, AnalysisError::MissingAttribute(name) if name.contains("TypeAttribute")));
        assert_eq!(dst.get::<CharTermAttribute>().unwrap().as_str(), "old");
    }

    #[test]
    fn test_snapshot_is_immutable_capture() {
        let mut src = AttributeSource::new();
        src.add_attribute::<CharTermAttribute>().set("first");
        let state = src.capture_state();
        src.add_attribute::<CharTermAttribute>().set("second");

        let mut dst = AttributeSource::new();
        dst.add_attribute::<CharTermAttribute>();
        dst.restore_state(&state).unwrap();
        assert_eq!(dst.get::<CharTermAttribute>().unwrap().as_str(), "first");
    }
}
