// Expression evaluation against a Memory

use super::value::{ArithOp, SymbolicValue};
use super::Memory;
use crate::trace::{BinaryOp, Expr, UnaryOp};

impl Memory {
    /// Evaluate a structural expression.
    ///
    /// Never fails: anything that cannot be resolved evaluates to
    /// [`SymbolicValue::RawString`] holding the expression text.
    pub fn evaluate(&self, expr: &Expr) -> SymbolicValue {
        let unresolved = || SymbolicValue::raw(expr.to_string());

        match expr {
            Expr::Number { value } => SymbolicValue::number(*value),
            Expr::Str { text } => SymbolicValue::raw(text.clone()),
            Expr::Null => SymbolicValue::Null,
            Expr::Var { name } => self
                .variable(name)
                .cloned()
                .unwrap_or_else(|| SymbolicValue::raw(name.clone())),
            Expr::Deref { pointer } => {
                let target = self.evaluate(pointer);
                self.dereference(&target).unwrap_or_else(unresolved)
            }
            Expr::AddrOf { target } => self.address_of(target).unwrap_or_else(unresolved),
            Expr::Index { base, index } => {
                let base = self.evaluate(base);
                self.evaluate(index)
                    .as_number()
                    .and_then(|index| self.element_of(&base, index))
                    .unwrap_or_else(unresolved)
            }
            Expr::Field { base, field, arrow } => {
                let base = self.evaluate(base);
                let record = if *arrow {
                    self.dereference(&base)
                } else {
                    Some(base)
                };
                record
                    .and_then(|record| record.field(field).cloned())
                    .unwrap_or_else(unresolved)
            }
            Expr::Unary { op, operand } => {
                let value = self.evaluate(operand);
                let result = match op {
                    UnaryOp::Not => value.truthiness().map(|truth| (!truth) as i64),
                    _ => value.as_number().map(|n| op.apply(n)),
                };
                result.map(SymbolicValue::number).unwrap_or_else(unresolved)
            }
            Expr::Binary { op, left, right } => self
                .evaluate_binary(*op, left, right)
                .unwrap_or_else(unresolved),
            Expr::Conditional {
                condition,
                then,
                otherwise,
            } => match self.evaluate(condition).truthiness() {
                Some(true) => self.evaluate(then),
                Some(false) => self.evaluate(otherwise),
                None => unresolved(),
            },
            Expr::List { elements } => SymbolicValue::Array {
                elements: elements.iter().map(|e| self.evaluate(e)).collect(),
            },
            Expr::Record { fields } => SymbolicValue::Record {
                fields: fields
                    .iter()
                    .map(|(name, e)| (name.clone(), self.evaluate(e)))
                    .collect(),
            },
            Expr::HeapAddress { token } => SymbolicValue::heap(*token),
            Expr::CallResult { call_id } => {
                self.call_result(*call_id).cloned().unwrap_or_else(unresolved)
            }
            Expr::Opaque { text } => SymbolicValue::raw(text.clone()),
        }
    }

    /// Follow a pointer exactly one level
    pub fn dereference(&self, pointer: &SymbolicValue) -> Option<SymbolicValue> {
        match pointer {
            SymbolicValue::VariableRef { name, scope } => self.referent(name, *scope).cloned(),
            SymbolicValue::ArrayElementRef {
                array,
                index,
                scope,
            } => {
                let referent = self.referent(array, *scope)?;
                match referent {
                    SymbolicValue::Array { .. } => referent.element(*index).cloned(),
                    other if *index == 0 => Some(other.clone()),
                    _ => None,
                }
            }
            SymbolicValue::HeapAddress { token } => {
                let value = self.heap.value(*token)?;
                match value {
                    SymbolicValue::Array { .. } => value.element(0).cloned(),
                    other => Some(other.clone()),
                }
            }
            SymbolicValue::PendingArithmetic { base, op, offset } => {
                match self.resolve_pending(base, *op, *offset)? {
                    SymbolicValue::PendingArithmetic { .. } => None,
                    resolved => self.dereference(&resolved),
                }
            }
            _ => None,
        }
    }

    /// Resolve `base op offset` against the current value of `base`
    pub fn resolve_pending(&self, base: &str, op: ArithOp, offset: i64) -> Option<SymbolicValue> {
        let current = self.variable(base).or_else(|| self.referent(base, None))?;
        let signed = op.apply(0, offset);
        match current.as_number() {
            Some(n) => Some(SymbolicValue::number(n.wrapping_add(signed))),
            None => offset_pointer(current, signed),
        }
    }

    fn address_of(&self, target: &Expr) -> Option<SymbolicValue> {
        match target {
            Expr::Var { name } => {
                let scope = self
                    .stack
                    .visible_index(name)
                    .map(|index| self.stack.frames()[index].id);
                Some(SymbolicValue::VariableRef {
                    name: name.clone(),
                    scope,
                })
            }
            Expr::Index { base, index } => {
                let offset = self.evaluate(index).as_number()?;
                if let Expr::Var { name } = base.as_ref() {
                    if let Some(frame) = self.stack.visible_index(name) {
                        let is_array = self
                            .stack
                            .binding_at(frame, name)
                            .is_some_and(|b| matches!(b.value, SymbolicValue::Array { .. }));
                        if is_array {
                            return Some(SymbolicValue::ArrayElementRef {
                                array: name.clone(),
                                index: offset,
                                scope: Some(self.stack.frames()[frame].id),
                            });
                        }
                    }
                }
                offset_pointer(&self.evaluate(base), offset)
            }
            Expr::Deref { pointer } => Some(self.evaluate(pointer)),
            _ => None,
        }
    }

    /// `base[index]` where `base` is an array or pointer value
    fn element_of(&self, base: &SymbolicValue, index: i64) -> Option<SymbolicValue> {
        match base {
            SymbolicValue::Array { .. } => base.element(index).cloned(),
            SymbolicValue::ArrayElementRef {
                array,
                index: start,
                scope,
            } => self
                .referent(array, *scope)?
                .element(start.wrapping_add(index))
                .cloned(),
            SymbolicValue::HeapAddress { token } => {
                let value = self.heap.value(*token)?;
                match value {
                    SymbolicValue::Array { .. } => value.element(index).cloned(),
                    other if index == 0 => Some(other.clone()),
                    _ => None,
                }
            }
            SymbolicValue::VariableRef { .. } if index == 0 => self.dereference(base),
            SymbolicValue::PendingArithmetic { base, op, offset } => {
                match self.resolve_pending(base, *op, *offset)? {
                    SymbolicValue::PendingArithmetic { .. } => None,
                    resolved => self.element_of(&resolved, index),
                }
            }
            SymbolicValue::RawString { text } => {
                let bytes = text.as_bytes();
                let index = usize::try_from(index).ok()?;
                match index.cmp(&bytes.len()) {
                    std::cmp::Ordering::Less => Some(SymbolicValue::number(bytes[index] as i64)),
                    std::cmp::Ordering::Equal => Some(SymbolicValue::number(0)),
                    std::cmp::Ordering::Greater => None,
                }
            }
            _ => None,
        }
    }

    fn evaluate_binary(&self, op: BinaryOp, left: &Expr, right: &Expr) -> Option<SymbolicValue> {
        let lhs = self.evaluate(left);

        // Short circuit
        match (op, lhs.truthiness()) {
            (BinaryOp::And, Some(false)) => return Some(SymbolicValue::number(0)),
            (BinaryOp::Or, Some(true)) => return Some(SymbolicValue::number(1)),
            _ => {}
        }

        let rhs = self.evaluate(right);

        if let (Some(a), Some(b)) = (lhs.as_number(), rhs.as_number()) {
            return op.apply(a, b).map(SymbolicValue::number);
        }

        match op {
            BinaryOp::And | BinaryOp::Or => {
                let a = lhs.truthiness()?;
                let b = rhs.truthiness()?;
                let result = if op == BinaryOp::And { a && b } else { a || b };
                Some(SymbolicValue::number(result as i64))
            }
            BinaryOp::Add | BinaryOp::Sub => {
                let sign = if op == BinaryOp::Add { 1 } else { -1 };
                if let Some(n) = rhs.as_number() {
                    if let Some(moved) = offset_pointer(&lhs, n.wrapping_mul(sign)) {
                        return Some(moved);
                    }
                    // Base not known yet: defer until it is
                    if let Some(name) = left.as_var() {
                        if !lhs.is_resolved() {
                            let arith = if op == BinaryOp::Add {
                                ArithOp::Add
                            } else {
                                ArithOp::Sub
                            };
                            return Some(SymbolicValue::PendingArithmetic {
                                base: name.to_string(),
                                op: arith,
                                offset: n,
                            });
                        }
                    }
                    return None;
                }
                if op == BinaryOp::Add {
                    let n = lhs.as_number()?;
                    return offset_pointer(&rhs, n);
                }
                element_distance(&lhs, &rhs).map(SymbolicValue::number)
            }
            _ if op.is_comparison() => compare_pointers(op, &lhs, &rhs).map(SymbolicValue::number),
            _ => None,
        }
    }
}

/// Move a pointer by `offset` elements
fn offset_pointer(pointer: &SymbolicValue, offset: i64) -> Option<SymbolicValue> {
    match pointer {
        SymbolicValue::ArrayElementRef {
            array,
            index,
            scope,
        } => Some(SymbolicValue::ArrayElementRef {
            array: array.clone(),
            index: index.wrapping_add(offset),
            scope: *scope,
        }),
        SymbolicValue::PendingArithmetic {
            base,
            op,
            offset: existing,
        } => {
            let total = op.apply(0, *existing).wrapping_add(offset);
            let (op, magnitude) = if total < 0 {
                (ArithOp::Sub, total.wrapping_neg())
            } else {
                (ArithOp::Add, total)
            };
            Some(SymbolicValue::PendingArithmetic {
                base: base.clone(),
                op,
                offset: magnitude,
            })
        }
        SymbolicValue::VariableRef { .. } | SymbolicValue::HeapAddress { .. } if offset == 0 => {
            Some(pointer.clone())
        }
        _ => None,
    }
}

/// Indices of two pointers into the same array
fn element_indices(left: &SymbolicValue, right: &SymbolicValue) -> Option<(i64, i64)> {
    match (left, right) {
        (
            SymbolicValue::ArrayElementRef {
                array: a, index: i, ..
            },
            SymbolicValue::ArrayElementRef {
                array: b, index: j, ..
            },
        ) if a == b => Some((*i, *j)),
        _ => None,
    }
}

/// `p - q` for two pointers into the same array
fn element_distance(left: &SymbolicValue, right: &SymbolicValue) -> Option<i64> {
    element_indices(left, right).map(|(i, j)| i.wrapping_sub(j))
}

fn compare_pointers(op: BinaryOp, left: &SymbolicValue, right: &SymbolicValue) -> Option<i64> {
    if let Some((i, j)) = element_indices(left, right) {
        return op.apply(i, j);
    }

    let is_null = |v: &SymbolicValue| {
        matches!(v, SymbolicValue::Null) || v.as_number() == Some(0)
    };
    let comparable = |v: &SymbolicValue| v.is_pointer() || v.as_number().is_some();
    if !comparable(left) || !comparable(right) {
        return None;
    }
    if matches!(left, SymbolicValue::PendingArithmetic { .. })
        || matches!(right, SymbolicValue::PendingArithmetic { .. })
    {
        return None;
    }

    let equal = (is_null(left) && is_null(right)) || left.detached() == right.detached();
    match op {
        BinaryOp::Eq => Some(equal as i64),
        BinaryOp::Ne => Some(!equal as i64),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::heap::HeapCell;
    use crate::memory::types::CType;

    fn memory_with_array() -> Memory {
        let mut memory = Memory::new();
        memory.stack.push_frame("main");
        memory.declare(
            "arr",
            SymbolicValue::Array {
                elements: vec![
                    SymbolicValue::number(1),
                    SymbolicValue::number(2),
                    SymbolicValue::number(3),
                ],
            },
            CType::scalar("int"),
            4,
        );
        memory
    }

    #[test]
    fn test_arithmetic_and_comparison() {
        let memory = Memory::new();
        let expr = Expr::binary(
            BinaryOp::Lt,
            Expr::binary(BinaryOp::Add, Expr::number(2), Expr::number(3)),
            Expr::number(10),
        );
        assert_eq!(memory.evaluate(&expr), SymbolicValue::number(1));
    }

    #[test]
    fn test_array_decay_and_pointer_arithmetic() {
        let memory = memory_with_array();
        let decayed = Expr::addr_of(Expr::index(Expr::var("arr"), Expr::number(0)));
        let moved = Expr::binary(BinaryOp::Add, decayed, Expr::number(2));

        let value = memory.evaluate(&moved);
        assert!(matches!(
            value,
            SymbolicValue::ArrayElementRef { ref array, index: 2, scope: Some(_) } if array == "arr"
        ));
        assert_eq!(
            memory.evaluate(&Expr::deref(moved)),
            SymbolicValue::number(3)
        );
    }

    #[test]
    fn test_unknown_base_defers_arithmetic() {
        let memory = Memory::new();
        let value = memory.evaluate(&Expr::binary(
            BinaryOp::Add,
            Expr::var("p"),
            Expr::number(2),
        ));
        assert_eq!(
            value,
            SymbolicValue::PendingArithmetic {
                base: "p".to_string(),
                op: ArithOp::Add,
                offset: 2
            }
        );
    }

    #[test]
    fn test_pending_arithmetic_resolves_lazily() {
        let mut memory = memory_with_array();
        memory.declare("p", SymbolicValue::element_ref("arr", 0), CType::pointer_to("int", 1), 16);
        let pending = SymbolicValue::PendingArithmetic {
            base: "p".to_string(),
            op: ArithOp::Add,
            offset: 1,
        };
        assert_eq!(memory.dereference(&pending), Some(SymbolicValue::number(2)));
    }

    #[test]
    fn test_heap_field_through_arrow() {
        let mut memory = Memory::new();
        memory.stack.push_frame("main");
        memory.heap.insert(HeapCell {
            address: 0x1000_0000,
            declared_type: CType::scalar("Node"),
            value: SymbolicValue::Record {
                fields: vec![("val".to_string(), SymbolicValue::number(7))],
            },
        });
        memory.declare("n", SymbolicValue::heap(0x1000_0000), CType::pointer_to("Node", 1), 4);

        let expr = Expr::Field {
            base: Box::new(Expr::var("n")),
            field: "val".to_string(),
            arrow: true,
        };
        assert_eq!(memory.evaluate(&expr), SymbolicValue::number(7));
    }

    #[test]
    fn test_extreme_pointer_indices_wrap() {
        let mut memory = memory_with_array();
        memory.declare("p", SymbolicValue::element_ref("arr", i64::MAX), CType::pointer_to("int", 1), 16);
        memory.declare("q", SymbolicValue::element_ref("arr", i64::MIN), CType::pointer_to("int", 1), 24);

        let distance = Expr::binary(BinaryOp::Sub, Expr::var("p"), Expr::var("q"));
        assert_eq!(memory.evaluate(&distance), SymbolicValue::number(-1));
        let after = Expr::binary(BinaryOp::Gt, Expr::var("p"), Expr::var("q"));
        assert_eq!(memory.evaluate(&after), SymbolicValue::number(1));
        let back = Expr::binary(BinaryOp::Sub, Expr::var("q"), Expr::number(i64::MIN));
        assert!(matches!(
            memory.evaluate(&back),
            SymbolicValue::ArrayElementRef { index: 0, .. }
        ));
    }

    #[test]
    fn test_null_comparison() {
        let mut memory = Memory::new();
        memory.stack.push_frame("main");
        memory.declare("p", SymbolicValue::Null, CType::pointer_to("int", 1), 4);
        let expr = Expr::binary(BinaryOp::Eq, Expr::var("p"), Expr::Null);
        assert_eq!(memory.evaluate(&expr), SymbolicValue::number(1));
    }
}
