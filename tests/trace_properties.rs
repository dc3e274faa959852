use pretty_assertions::assert_eq;
use tracetty::executor::{Effect, Executor, RecordingSink};
use tracetty::memory::value::SymbolicValue;
use tracetty::parser::parse;
use tracetty::trace::{BranchKind, BranchLabel, StepKind, Trace};
use tracetty::unroller::unroll;

fn trace_of(source: &str) -> Trace {
    let root = parse(source).expect("Parsing failed");
    unroll(&root)
}

fn effects_of(source: &str) -> Vec<Effect> {
    let mut executor = Executor::new(trace_of(source), RecordingSink::new());
    executor.run_to_completion();
    executor.sink().since_reset().to_vec()
}

fn variable_sets(effects: &[Effect]) -> Vec<(String, SymbolicValue)> {
    effects
        .iter()
        .filter_map(|effect| match effect {
            Effect::SetVariable { name, value, .. } => Some((name.clone(), value.clone())),
            _ => None,
        })
        .collect()
}

#[test]
fn test_unbounded_program_still_terminates() {
    let source = r#"
        int spin(int n) {
            while (1) {
                n = n + 1;
            }
            return spin(n);
        }

        int main() {
            int x = 0;
            while (x >= 0) {
                x = spin(x);
            }
            return 0;
        }
    "#;
    let trace = trace_of(source);
    assert!(!trace.is_empty());

    let mut executor = Executor::new(trace, RecordingSink::new());
    executor.run_to_completion();
    assert!(executor.is_finished());
}

#[test]
fn test_replay_is_deterministic() {
    let source = r#"
        int main() {
            int total = 0;
            int *p = malloc(sizeof(int));
            for (int i = 0; i < 4; i++) {
                total = total + i;
            }
            *p = total;
            printf("%d\n", *p);
            return 0;
        }
    "#;
    assert_eq!(effects_of(source), effects_of(source));
}

#[test]
fn test_seek_is_idempotent() {
    let source = r#"
        int main() {
            int a[3] = {1, 2, 3};
            int *p = a;
            p++;
            *p = 7;
            int *h = malloc(sizeof(int));
            *h = a[1];
            return 0;
        }
    "#;
    let trace = trace_of(source);
    let mut executor = Executor::new(trace.clone(), RecordingSink::new());
    for k in 0..=trace.len() {
        executor.seek(k);
        let first = executor.snapshot();
        let first_effects = executor.sink().since_reset().to_vec();
        executor.seek(k);
        assert_eq!(executor.snapshot(), first);
        assert_eq!(executor.sink().since_reset(), first_effects.as_slice());
    }
}

#[test]
fn test_false_condition_only_runs_else_arm() {
    let source = r#"
        int main() {
            int x = 1;
            if (x > 3) {
                x = 100;
                printf("then\n");
            } else {
                x = 200;
                printf("else\n");
            }
            return x;
        }
    "#;
    let trace = trace_of(source);
    let owner = trace
        .iter()
        .position(|step| {
            matches!(
                step.kind,
                StepKind::Branch {
                    kind: BranchKind::If,
                    ..
                }
            )
        })
        .expect("if branch step");
    let tagged = |label: BranchLabel| -> Vec<usize> {
        trace
            .iter()
            .enumerate()
            .filter(|(_, step)| {
                step.tags
                    .iter()
                    .any(|tag| tag.owner == owner && tag.label == label)
            })
            .map(|(index, _)| index)
            .collect()
    };
    let then_steps = tagged(BranchLabel::Then);
    let else_steps = tagged(BranchLabel::Else);
    assert!(!then_steps.is_empty());
    assert!(!else_steps.is_empty());

    let mut executor = Executor::new(trace, RecordingSink::new());
    executor.run_to_completion();
    let applied = executor.applied();
    assert!(then_steps.iter().all(|index| !applied.contains(index)));
    assert!(else_steps.iter().all(|index| applied.contains(index)));
    assert_eq!(executor.sink().output(), "else\n");
}

#[test]
fn test_switch_without_match_runs_default_only() {
    let source = r#"
        int main() {
            int x = 5;
            int y = 0;
            switch (x) {
                case 1:
                    y = 10;
                    break;
                case 2:
                    y = 20;
                    break;
                default:
                    y = 30;
            }
            return y;
        }
    "#;
    let trace = trace_of(source);
    let mut executor = Executor::new(trace.clone(), RecordingSink::new());
    executor.run_to_completion();

    for &index in executor.applied() {
        let step = trace.get(index).expect("applied step exists");
        assert!(
            step.tags
                .iter()
                .all(|tag| tag.label == BranchLabel::CaseDefault),
            "step {} should not run: {}",
            index,
            step.describe()
        );
    }
    let y_values: Vec<SymbolicValue> = variable_sets(executor.sink().since_reset())
        .into_iter()
        .filter(|(name, _)| name == "y")
        .map(|(_, value)| value)
        .collect();
    assert_eq!(
        y_values,
        vec![SymbolicValue::number(0), SymbolicValue::number(30)]
    );
}

#[test]
fn test_pointer_retarget_emits_variable_refs() {
    let source = r#"
        int main() {
            int x = 10, y = 99;
            int* ptr = &x;
            ptr = &y;
            return 0;
        }
    "#;
    let effects = effects_of(source);
    assert!(!effects
        .iter()
        .any(|effect| matches!(effect, Effect::AllocateHeap { .. } | Effect::UpdateHeap { .. })));

    let sets = variable_sets(&effects);
    let names: Vec<&str> = sets.iter().map(|(name, _)| name.as_str()).collect();
    assert_eq!(names, vec!["x", "y", "ptr", "ptr"]);
    assert_eq!(sets[0].1, SymbolicValue::number(10));
    assert_eq!(sets[1].1, SymbolicValue::number(99));
    assert!(matches!(&sets[2].1, SymbolicValue::VariableRef { name, .. } if name == "x"));
    assert!(matches!(&sets[3].1, SymbolicValue::VariableRef { name, .. } if name == "y"));
}

#[test]
fn test_new_then_deref_store_updates_heap_cell() {
    let source = r#"
        int main() {
            int* ptr = new int(42);
            *ptr = 100;
            return 0;
        }
    "#;
    let heap: Vec<Effect> = effects_of(source)
        .into_iter()
        .filter(|effect| matches!(effect, Effect::AllocateHeap { .. } | Effect::UpdateHeap { .. }))
        .collect();
    assert_eq!(heap.len(), 2);
    let (allocated_at, allocated) = match &heap[0] {
        Effect::AllocateHeap { address, value } => (*address, value.clone()),
        other => panic!("expected allocation, got {:?}", other),
    };
    assert_eq!(allocated, SymbolicValue::number(42));
    assert_eq!(
        heap[1],
        Effect::UpdateHeap {
            address: allocated_at,
            value: SymbolicValue::number(100),
        }
    );
}

#[test]
fn test_pointer_walk_over_array() {
    let source = r#"
        int main() {
            int arr[3] = {1, 2, 3};
            int* p = arr;
            p++;
            *p = 9;
            return 0;
        }
    "#;
    let sets = variable_sets(&effects_of(source));
    let last_arr = sets
        .iter()
        .rev()
        .find(|(name, _)| name == "arr")
        .map(|(_, value)| value.clone());
    assert_eq!(
        last_arr,
        Some(SymbolicValue::Array {
            elements: vec![
                SymbolicValue::number(1),
                SymbolicValue::number(9),
                SymbolicValue::number(3),
            ],
        })
    );
    let pointer_values: Vec<SymbolicValue> = sets
        .into_iter()
        .filter(|(name, _)| name == "p")
        .map(|(_, value)| value)
        .collect();
    assert!(matches!(
        pointer_values.last(),
        Some(SymbolicValue::ArrayElementRef { array, index: 1, .. }) if array == "arr"
    ));
}

#[test]
fn test_loop_trimmed_to_runtime_iterations() {
    let source = r#"
        int limit(int n) {
            return n;
        }

        int main() {
            int n = limit(2);
            int count = 0;
            while (count < n) {
                count++;
            }
            printf("%d\n", count);
            return 0;
        }
    "#;
    let trace = trace_of(source);
    let mut executor = Executor::new(trace.clone(), RecordingSink::new());
    executor.run_to_completion();
    let entered = executor
        .applied()
        .iter()
        .filter(|&&index| {
            matches!(
                trace.get(index).map(|step| &step.kind),
                Some(StepKind::LoopEnter { .. })
            )
        })
        .count();
    assert_eq!(entered, 2);
    assert_eq!(executor.sink().output(), "2\n");
}

#[test]
fn test_template_resolves_pointer_placeholders() {
    let source = r#"
        int main() {
            int v = 5;
            int *p = &v;
            int **pp = &p;
            printf("%d %d %d {}\n", v, *p, **pp);
            return 0;
        }
    "#;
    let texts: Vec<String> = effects_of(source)
        .into_iter()
        .filter_map(|effect| match effect {
            Effect::LogOutput { text } => Some(text),
            _ => None,
        })
        .collect();
    assert_eq!(texts, vec!["5 5 5 {}\n".to_string()]);
}

#[test]
fn test_store_through_double_pointer_moves_one_level() {
    let source = r#"
        int main() {
            int x = 1;
            int y = 2;
            int *p = &x;
            int **pp = &p;
            *pp = &y;
            *p = 5;
            printf("%d %d\n", x, y);
            return 0;
        }
    "#;
    let effects = effects_of(source);
    let sets = variable_sets(&effects);
    assert!(sets
        .iter()
        .any(|(name, value)| name == "p"
            && matches!(value, SymbolicValue::VariableRef { name, .. } if name == "y")));
    assert!(!sets
        .iter()
        .any(|(name, value)| name == "x" && *value == SymbolicValue::number(5)));

    let mut executor = Executor::new(trace_of(source), RecordingSink::new());
    executor.run_to_completion();
    assert_eq!(executor.sink().output(), "1 5\n");
}

#[test]
fn test_unresolved_pointer_store_is_skipped() {
    let source = r#"
        int main() {
            int x = 1;
            int *q;
            *q = 3;
            int *r = lookup();
            *r = 4;
            x = x + 1;
            printf("%d\n", x);
            return 0;
        }
    "#;
    let trace = trace_of(source);
    let mut executor = Executor::new(trace.clone(), RecordingSink::new());
    executor.run_to_completion();
    assert!(executor.is_finished());
    assert_eq!(executor.applied().len(), trace.len());
    assert_eq!(executor.sink().output(), "2\n");
    assert!(!executor
        .sink()
        .since_reset()
        .iter()
        .any(|effect| matches!(effect, Effect::UpdateHeap { .. })));
}

#[test]
fn test_undecidable_condition_keeps_both_arms() {
    let source = r#"
        int main() {
            int k = rand();
            if (k > 3) {
                printf("big\n");
                return 0;
            }
            printf("small\n");
            return 1;
        }
    "#;
    let trace = trace_of(source);
    let owner = trace
        .iter()
        .position(|step| {
            matches!(
                step.kind,
                StepKind::Branch {
                    kind: BranchKind::If,
                    ..
                }
            )
        })
        .expect("if branch step");
    let outputs: Vec<(usize, Vec<BranchLabel>)> = trace
        .iter()
        .enumerate()
        .filter(|(_, step)| matches!(step.kind, StepKind::LogOutput { .. }))
        .map(|(index, step)| {
            let labels = step
                .tags
                .iter()
                .filter(|tag| tag.owner == owner)
                .map(|tag| tag.label)
                .collect();
            (index, labels)
        })
        .collect();
    assert_eq!(outputs.len(), 2);
    assert_eq!(outputs[0].1, vec![BranchLabel::Then]);
    assert_eq!(outputs[1].1, vec![BranchLabel::Else]);

    let mut executor = Executor::new(trace, RecordingSink::new());
    executor.run_to_completion();
    assert!(!executor.applied().contains(&outputs[0].0));
    assert!(executor.applied().contains(&outputs[1].0));
    assert_eq!(executor.sink().output(), "small\n");
}
