//! Property arrays consumed by the movie-construction call
//!
//! A [`PropertyArray`] flattens several property lists, in order, into the
//! wire records the decode engine reads. Each record points at boxed storage
//! owned by the array, so the addresses stay valid for as long as the array
//! lives. Duplicate keys are kept; whether the engine honours the first or
//! the last one is up to the engine.

use common::{FourCc, MovieProperty, PropertyDiagnostic, PropertyValue};
use std::ffi::{CString, c_void};

/// Wire record for one movie-construction property.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct PropertyElement {
    pub prop_class: u32,
    pub prop_id: u32,
    pub prop_value_size: u32,
    pub prop_value_address: *const c_void,
    pub prop_status: i32,
}

/// Native storage backing one record's value address
enum ValueStorage {
    Byte(Box<u8>),
    Word(Box<u32>),
    SignedWord(Box<i32>),
    Pointer {
        ptr: Box<*const c_void>,
        _text: Option<CString>,
    },
}

impl ValueStorage {
    fn new(value: &PropertyValue) -> Self {
        match value {
            PropertyValue::Bool(flag) => Self::Byte(Box::new(u8::from(*flag))),
            PropertyValue::U32(v) => Self::Word(Box::new(*v)),
            PropertyValue::I32(v) => Self::SignedWord(Box::new(*v)),
            PropertyValue::Text(s) | PropertyValue::Url(s) => {
                // Interior NULs cannot cross the boundary
                let text = CString::new(s.as_str()).unwrap_or_default();
                Self::Pointer {
                    ptr: Box::new(text.as_ptr() as *const c_void),
                    _text: Some(text),
                }
            }
            PropertyValue::Handle(handle) => Self::Pointer {
                ptr: Box::new(handle.as_raw() as *const c_void),
                _text: None,
            },
        }
    }

    fn address(&self) -> *const c_void {
        match self {
            Self::Byte(b) => &**b as *const u8 as *const c_void,
            Self::Word(w) => &**w as *const u32 as *const c_void,
            Self::SignedWord(w) => &**w as *const i32 as *const c_void,
            Self::Pointer { ptr, .. } => &**ptr as *const *const c_void as *const c_void,
        }
    }
}

/// Ordered, immutable property list plus its wire form.
pub struct PropertyArray {
    entries: Vec<MovieProperty>,
    elements: Vec<PropertyElement>,
    _storage: Vec<ValueStorage>,
}

impl PropertyArray {
    /// Flatten `lists` in order into a single property array
    pub fn build(lists: &[&[MovieProperty]]) -> Self {
        let entries: Vec<MovieProperty> = lists.iter().flat_map(|l| l.iter().cloned()).collect();

        let storage: Vec<ValueStorage> = entries.iter().map(|p| ValueStorage::new(&p.value)).collect();

        let elements = entries
            .iter()
            .zip(storage.iter())
            .map(|(prop, store)| PropertyElement {
                prop_class: prop.class.as_u32(),
                prop_id: prop.id.as_u32(),
                prop_value_size: prop.value.native_size(),
                prop_value_address: store.address(),
                prop_status: 0,
            })
            .collect();

        Self {
            entries,
            elements,
            _storage: storage,
        }
    }

    pub fn entries(&self) -> &[MovieProperty] {
        &self.entries
    }

    pub fn elements(&self) -> &[PropertyElement] {
        &self.elements
    }

    /// Pointer to the first wire record, for native construction calls
    pub fn as_mut_ptr(&mut self) -> *mut PropertyElement {
        self.elements.as_mut_ptr()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn status(&self, index: usize) -> Option<i32> {
        self.elements.get(index).map(|e| e.prop_status)
    }

    pub fn set_status(&mut self, index: usize, status: i32) {
        if let Some(element) = self.elements.get_mut(index) {
            element.prop_status = status;
        }
    }

    /// First entry matching `class`/`id`
    pub fn find(&self, class: FourCc, id: FourCc) -> Option<(usize, &PropertyValue)> {
        self.entries
            .iter()
            .enumerate()
            .find(|(_, p)| p.class == class && p.id == id)
            .map(|(i, p)| (i, &p.value))
    }

    /// Per-record statuses as reported by the engine
    pub fn diagnostics(&self) -> Vec<PropertyDiagnostic> {
        self.elements
            .iter()
            .map(|e| PropertyDiagnostic {
                class: FourCc::from_u32(e.prop_class),
                id: FourCc::from_u32(e.prop_id),
                status: e.prop_status,
            })
            .collect()
    }

    /// Dump every record with its status at the given log level
    pub fn log_dump(&self, level: log::Level) {
        if !log::log_enabled!(level) {
            return;
        }
        log::log!(level, "Movie properties ({}):", self.len());
        for diag in self.diagnostics() {
            log::log!(level, "    {} {} status={}", diag.class, diag.id, diag.status);
        }
    }
}

impl std::fmt::Debug for PropertyArray {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertyArray")
            .field("entries", &self.entries)
            .finish()
    }
}
