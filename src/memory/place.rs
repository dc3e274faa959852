// Assignable locations: resolving lvalues and writing through them

use super::value::{HeapToken, SymbolicValue};
use super::Memory;
use crate::trace::Expr;

/// Where a place's storage lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaceRoot {
    /// A binding in the frame at `frame` (index into the scope stack)
    Binding { frame: usize, name: String },
    Heap { token: HeapToken },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathSegment {
    Index(i64),
    Field(String),
}

/// A root plus a path into its aggregate value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Place {
    pub root: PlaceRoot,
    pub path: Vec<PathSegment>,
}

impl Place {
    fn root(root: PlaceRoot) -> Self {
        Place {
            root,
            path: Vec::new(),
        }
    }

    fn with(mut self, segment: PathSegment) -> Self {
        self.path.push(segment);
        self
    }
}

impl Memory {
    /// Resolve an lvalue expression
    pub fn place_of(&self, expr: &Expr) -> Option<Place> {
        match expr {
            Expr::Var { name } => {
                let frame = self.stack.visible_index(name)?;
                Some(Place::root(PlaceRoot::Binding {
                    frame,
                    name: name.clone(),
                }))
            }
            Expr::Deref { pointer } => self.place_of_pointer(&self.evaluate(pointer)),
            Expr::Index { base, index } => {
                let offset = self.evaluate(index).as_number()?;
                if let Some(place) = self.place_of(base) {
                    if matches!(self.read_place(&place), Some(SymbolicValue::Array { .. })) {
                        return Some(place.with(PathSegment::Index(offset)));
                    }
                }
                self.place_of_element(&self.evaluate(base), offset)
            }
            Expr::Field { base, field, arrow } => {
                let place = if *arrow {
                    self.place_of_pointer(&self.evaluate(base))?
                } else {
                    self.place_of(base)?
                };
                Some(place.with(PathSegment::Field(field.clone())))
            }
            _ => None,
        }
    }

    /// The location a pointer value refers to
    pub fn place_of_pointer(&self, pointer: &SymbolicValue) -> Option<Place> {
        self.place_of_element(pointer, 0)
    }

    /// The location `pointer[offset]` refers to
    fn place_of_element(&self, pointer: &SymbolicValue, offset: i64) -> Option<Place> {
        match pointer {
            SymbolicValue::VariableRef { name, scope } if offset == 0 => {
                let frame = self.stack.referent_index(name, *scope)?;
                Some(Place::root(PlaceRoot::Binding {
                    frame,
                    name: name.clone(),
                }))
            }
            SymbolicValue::ArrayElementRef {
                array,
                index,
                scope,
            } => {
                let frame = self.stack.referent_index(array, *scope)?;
                let place = Place::root(PlaceRoot::Binding {
                    frame,
                    name: array.clone(),
                });
                let is_array = matches!(
                    self.read_place(&place),
                    Some(SymbolicValue::Array { .. })
                );
                let index = index.wrapping_add(offset);
                match (is_array, index) {
                    (true, _) => Some(place.with(PathSegment::Index(index))),
                    (false, 0) => Some(place),
                    _ => None,
                }
            }
            SymbolicValue::HeapAddress { token } => {
                let value = self.heap.value(*token)?;
                let place = Place::root(PlaceRoot::Heap { token: *token });
                match (value, offset) {
                    (SymbolicValue::Array { .. }, _) => Some(place.with(PathSegment::Index(offset))),
                    (_, 0) => Some(place),
                    _ => None,
                }
            }
            SymbolicValue::PendingArithmetic { base, op, offset: by } => {
                match self.resolve_pending(base, *op, *by)? {
                    SymbolicValue::PendingArithmetic { .. } => None,
                    resolved => self.place_of_element(&resolved, offset),
                }
            }
            _ => None,
        }
    }

    pub fn root_value(&self, root: &PlaceRoot) -> Option<&SymbolicValue> {
        match root {
            PlaceRoot::Binding { frame, name } => {
                self.stack.binding_at(*frame, name).map(|b| &b.value)
            }
            PlaceRoot::Heap { token } => self.heap.value(*token),
        }
    }

    pub fn read_place(&self, place: &Place) -> Option<&SymbolicValue> {
        let mut value = self.root_value(&place.root)?;
        for segment in &place.path {
            value = match segment {
                PathSegment::Index(index) => value.element(*index)?,
                PathSegment::Field(field) => value.field(field)?,
            };
        }
        Some(value)
    }

    /// Store `value` at `place`. Missing record fields are created; out of
    /// range indices and dangling roots leave memory untouched.
    pub fn write_place(&mut self, place: &Place, value: SymbolicValue) -> Option<()> {
        let mut slot: &mut SymbolicValue = match &place.root {
            PlaceRoot::Binding { frame, name } => &mut self.stack.binding_at_mut(*frame, name)?.value,
            PlaceRoot::Heap { token } => &mut self.heap.get_mut(*token)?.value,
        };
        for segment in &place.path {
            slot = match segment {
                PathSegment::Index(index) => slot.element_mut(*index)?,
                PathSegment::Field(field) => {
                    if slot.field(field).is_none() {
                        slot.set_field(field, SymbolicValue::Uninitialized);
                    }
                    slot.field_mut(field)?
                }
            };
        }
        *slot = value;
        Some(())
    }
}
