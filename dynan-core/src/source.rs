//! # Fontes de Caracteres
//!
//! Um analisador consome o texto através de uma [`CharSource`]: um `io::Read` (bytes UTF-8)
//! com duas informações extras usadas pelo mecanismo de duplicação ([`crate::cloner`]):
//!
//! 1. **Forma** ([`SourceShape`]): o "tipo" concreto da fonte, organizado numa hierarquia
//!    que termina sempre em [`SourceShape::GENERIC`]. A resolução de estratégia sobe essa
//!    hierarquia até achar uma estratégia registrada.
//! 2. **Capacidade de duplicação** ([`Duplicatable`]): fontes cujo buffer já está
//!    materializado em memória podem expô-lo, permitindo cópias sem cópia de dados
//!    (*zero-copy*). Fontes que não implementam a capacidade caem na estratégia genérica
//!    de bufferização.
//!
//! | Fonte | Forma | Buffer exposto |
//! |-------|-------|----------------|
//! | [`StringSource`] | `string` | `Arc<str>` |
//! | [`ReusableStringSource`] | `reusable-string` (filha de `string`) | `Arc<str>` |
//! | [`CharArraySource`] | `char-array` | `Arc<[char]>` |
//! | [`ReaderSource`] | `generic` (ou derivada) | - |

use std::fmt;
use std::io::{self, Read};
use std::ops::Range;
use std::sync::Arc;

/// A "forma" de uma fonte, com ponteiro para a forma mais genérica da qual deriva.
#[derive(Clone, Copy)]
pub struct SourceShape {
    name: &'static str,
    parent: Option<&'static SourceShape>,
}

impl SourceShape {
    /// Forma universal: qualquer `io::Read`. Sempre tem uma estratégia registrada.
    pub const GENERIC: SourceShape = SourceShape {
        name: "generic",
        parent: None,
    };
    pub const STRING: SourceShape = SourceShape {
        name: "string",
        parent: Some(&SourceShape::GENERIC),
    };
    /// Deriva de `string`: sem binding próprio, herda a estratégia de `string`.
    pub const REUSABLE_STRING: SourceShape = SourceShape {
        name: "reusable-string",
        parent: Some(&SourceShape::STRING),
    };
    pub const CHAR_ARRAY: SourceShape = SourceShape {
        name: "char-array",
        parent: Some(&SourceShape::GENERIC),
    };

    /// Declara uma forma nova derivada de `parent` (para fontes definidas fora do crate).
    pub const fn derived(name: &'static str, parent: &'static SourceShape) -> Self {
        Self {
            name,
            parent: Some(parent),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn parent(&self) -> Option<SourceShape> {
        self.parent.copied()
    }

    /// A própria forma seguida de seus ancestrais, da mais específica à universal.
    pub fn ancestry(&self) -> impl Iterator<Item = SourceShape> {
        std::iter::successors(Some(*self), |shape| shape.parent())
    }
}

impl PartialEq for SourceShape {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for SourceShape {}

impl fmt::Debug for SourceShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let chain: Vec<&str> = self.ancestry().map(|s| s.name).collect();
        write!(f, "SourceShape({})", chain.join(" -> "))
    }
}

/// Buffer já materializado de uma fonte, restrito à parte ainda não lida.
#[derive(Debug, Clone)]
pub enum BackingBuffer {
    /// Texto compartilhado; `range` em bytes.
    Text { text: Arc<str>, range: Range<usize> },
    /// Array de caracteres compartilhado; `range` em índices de `char`.
    Chars { chars: Arc<[char]>, range: Range<usize> },
}

/// Capacidade de duplicação sem cópia: expõe o buffer interno da fonte.
pub trait Duplicatable {
    /// `None` quando o cursor parou no meio de um caractere: o resto da fonte não
    /// corresponde a nenhuma fatia do buffer.
    fn backing_buffer(&self) -> Option<BackingBuffer>;
}

/// Uma fonte de caracteres consumível por um analisador.
pub trait CharSource: Read + Send {
    fn shape(&self) -> SourceShape {
        SourceShape::GENERIC
    }

    fn as_duplicatable(&self) -> Option<&dyn Duplicatable> {
        None
    }

    /// Libera a fonte. Leituras posteriores falham.
    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn closed_error() -> io::Error {
    io::Error::new(io::ErrorKind::Other, "source closed")
}

// =====================================================================
// StringSource
// =====================================================================

/// Fonte sobre uma fatia de um texto compartilhado (`Arc<str>`).
///
/// Várias `StringSource` podem apontar para o mesmo texto sem copiá-lo; cada uma
/// mantém seu próprio cursor.
#[derive(Debug, Clone)]
pub struct StringSource {
    text: Arc<str>,
    end: usize,
    pos: usize,
    closed: bool,
}

impl StringSource {
    pub fn new(text: impl Into<Arc<str>>) -> Self {
        let text = text.into();
        let end = text.len();
        Self {
            text,
            end,
            pos: 0,
            closed: false,
        }
    }

    /// Fonte sobre `text[range]`. O range é limitado ao tamanho do texto.
    pub fn from_shared(text: Arc<str>, range: Range<usize>) -> Self {
        let end = range.end.min(text.len());
        let pos = range.start.min(end);
        Self {
            text,
            end,
            pos,
            closed: false,
        }
    }

    /// Conteúdo ainda não lido, ou `None` se a leitura parou no meio de um caractere.
    pub fn remaining(&self) -> Option<&str> {
        self.text.get(self.pos..self.end)
    }
}

impl Read for StringSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.closed {
            return Err(closed_error());
        }
        let bytes = &self.text.as_bytes()[self.pos..self.end];
        let n = bytes.len().min(buf.len());
        buf[..n].copy_from_slice(&bytes[..n]);
        self.pos += n;
        Ok(n)
    }
}

impl Duplicatable for StringSource {
    fn backing_buffer(&self) -> Option<BackingBuffer> {
        self.text.is_char_boundary(self.pos).then(|| BackingBuffer::Text {
            text: Arc::clone(&self.text),
            range: self.pos..self.end,
        })
    }
}

impl CharSource for StringSource {
    fn shape(&self) -> SourceShape {
        SourceShape::STRING
    }

    fn as_duplicatable(&self) -> Option<&dyn Duplicatable> {
        Some(self)
    }

    fn close(&mut self) -> io::Result<()> {
        self.closed = true;
        Ok(())
    }
}

// =====================================================================
// ReusableStringSource
// =====================================================================

/// Fonte de texto cujo valor pode ser trocado entre requisições, evitando
/// alocar uma fonte nova para cada documento.
#[derive(Debug, Clone)]
pub struct ReusableStringSource {
    value: Arc<str>,
    pos: usize,
    closed: bool,
}

impl ReusableStringSource {
    pub fn new() -> Self {
        Self {
            value: Arc::from(""),
            pos: 0,
            closed: false,
        }
    }

    /// Substitui o conteúdo e reabre a fonte.
    pub fn set_value(&mut self, value: impl Into<Arc<str>>) {
        self.value = value.into();
        self.pos = 0;
        self.closed = false;
    }
}

impl Default for ReusableStringSource {
    fn default() -> Self {
        Self::new()
    }
}

impl Read for ReusableStringSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.closed {
            return Err(closed_error());
        }
        let bytes = &self.value.as_bytes()[self.pos..];
        let n = bytes.len().min(buf.len());
        buf[..n].copy_from_slice(&bytes[..n]);
        self.pos += n;
        Ok(n)
    }
}

impl Duplicatable for ReusableStringSource {
    fn backing_buffer(&self) -> Option<BackingBuffer> {
        self.value.is_char_boundary(self.pos).then(|| BackingBuffer::Text {
            text: Arc::clone(&self.value),
            range: self.pos..self.value.len(),
        })
    }
}

impl CharSource for ReusableStringSource {
    fn shape(&self) -> SourceShape {
        SourceShape::REUSABLE_STRING
    }

    fn as_duplicatable(&self) -> Option<&dyn Duplicatable> {
        Some(self)
    }

    fn close(&mut self) -> io::Result<()> {
        self.closed = true;
        Ok(())
    }
}

// =====================================================================
// CharArraySource
// =====================================================================

/// Fonte sobre uma fatia de um array de `char` compartilhado.
///
/// A leitura codifica os caracteres em UTF-8 sob demanda; um caractere que não cabe
/// inteiro no buffer do leitor fica pendente para a próxima chamada.
#[derive(Debug, Clone)]
pub struct CharArraySource {
    chars: Arc<[char]>,
    end: usize,
    pos: usize,
    pending: [u8; 4],
    pending_start: usize,
    pending_len: usize,
    closed: bool,
}

impl CharArraySource {
    pub fn new(chars: impl Into<Arc<[char]>>) -> Self {
        let chars = chars.into();
        let end = chars.len();
        Self::from_shared(chars, 0..end)
    }

    pub fn from_text(text: &str) -> Self {
        Self::new(text.chars().collect::<Vec<char>>())
    }

    pub fn from_shared(chars: Arc<[char]>, range: Range<usize>) -> Self {
        let end = range.end.min(chars.len());
        let pos = range.start.min(end);
        Self {
            chars,
            end,
            pos,
            pending: [0; 4],
            pending_start: 0,
            pending_len: 0,
            closed: false,
        }
    }
}

impl Read for CharArraySource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.closed {
            return Err(closed_error());
        }
        let mut written = 0;
        while written < buf.len() {
            if self.pending_start < self.pending_len {
                let n = (self.pending_len - self.pending_start).min(buf.len() - written);
                buf[written..written + n]
                    .copy_from_slice(&self.pending[self.pending_start..self.pending_start + n]);
                self.pending_start += n;
                written += n;
                continue;
            }
            if self.pos >= self.end {
                break;
            }
            let ch = self.chars[self.pos];
            self.pos += 1;
            self.pending_len = ch.encode_utf8(&mut self.pending).len();
            self.pending_start = 0;
        }
        Ok(written)
    }
}

impl Duplicatable for CharArraySource {
    fn backing_buffer(&self) -> Option<BackingBuffer> {
        // Bytes pendentes de um caractere já consumido do array
        if self.pending_start < self.pending_len {
            return None;
        }
        Some(BackingBuffer::Chars {
            chars: Arc::clone(&self.chars),
            range: self.pos..self.end,
        })
    }
}

impl CharSource for CharArraySource {
    fn shape(&self) -> SourceShape {
        SourceShape::CHAR_ARRAY
    }

    fn as_duplicatable(&self) -> Option<&dyn Duplicatable> {
        Some(self)
    }

    fn close(&mut self) -> io::Result<()> {
        self.closed = true;
        Ok(())
    }
}

// =====================================================================
// ReaderSource
// =====================================================================

/// Adapta qualquer `io::Read` (arquivo, socket, cursor...) como fonte genérica.
pub struct ReaderSource<R> {
    inner: Option<R>,
    shape: SourceShape,
}

impl<R: Read + Send> ReaderSource<R> {
    pub fn new(reader: R) -> Self {
        Self::with_shape(reader, SourceShape::GENERIC)
    }

    /// Fonte com forma própria, tipicamente criada por [`SourceShape::derived`].
    pub fn with_shape(reader: R, shape: SourceShape) -> Self {
        Self {
            inner: Some(reader),
            shape,
        }
    }
}

impl<R: Read + Send> Read for ReaderSource<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.inner.as_mut() {
            Some(reader) => reader.read(buf),
            None => Err(closed_error()),
        }
    }
}

impl<R: Read + Send> CharSource for ReaderSource<R> {
    fn shape(&self) -> SourceShape {
        self.shape
    }

    fn close(&mut self) -> io::Result<()> {
        self.inner = None;
        Ok(())
    }
}
