use tracing::debug;

use crate::classfile::insn::op;
use crate::classfile::{Constant, DynamicCall, Insn, MethodHandle, Operand, access};
use crate::error::LoadError;
use crate::graph::{ClassGraph, number_of};
use crate::model::{ClassId, FieldId, Initializer, InsnTarget, MethodId, Number, Side};

const LAMBDA_FACTORY: &str = "java/lang/invoke/LambdaMetafactory";
const REF_INVOKE_STATIC: u8 = 6;

/// Implementation handle of a `LambdaMetafactory` call site.
pub(crate) fn lambda_impl(call: &DynamicCall) -> Option<&MethodHandle> {
    let bsm = &call.bootstrap;
    if bsm.owner != LAMBDA_FACTORY || !matches!(bsm.name.as_str(), "metafactory" | "altMetafactory") {
        return None;
    }
    match call.args.get(1) {
        Some(Constant::MethodHandle(handle)) => Some(handle),
        _ => None,
    }
}

/// Walks every input method body and records call, field access, type and constant edges.
pub(super) fn wire_references(graph: &mut ClassGraph) -> Result<(), LoadError> {
    for side in [Side::A, Side::B] {
        let inputs: Vec<ClassId> = graph
            .classes(side)
            .iter()
            .copied()
            .filter(|c| graph.class(*c).is_input())
            .collect();
        for class in inputs {
            let methods: Vec<MethodId> = graph.real_methods(class).collect();
            for method in methods {
                wire_method(graph, side, method)?;
            }
        }
    }
    Ok(())
}

fn wire_method(graph: &mut ClassGraph, side: Side, method: MethodId) -> Result<(), LoadError> {
    let owner = graph.method(method).owner;
    let Some(body) = graph.class(owner).body.clone() else {
        return Ok(());
    };
    let Some(code) = graph
        .method(method)
        .body_index
        .and_then(|i| body.methods.get(i))
        .and_then(|m| m.code.as_ref())
    else {
        return Ok(());
    };

    let mut targets = Vec::with_capacity(code.insns.len());
    for insn in &code.insns {
        targets.push(wire_insn(graph, side, owner, method, insn)?);
    }
    graph.set_insn_targets(method, targets);
    Ok(())
}

fn wire_insn(
    graph: &mut ClassGraph,
    side: Side,
    owner: ClassId,
    method: MethodId,
    insn: &Insn,
) -> Result<InsnTarget, LoadError> {
    let target = match &insn.operand {
        Operand::Int(v) if matches!(insn.opcode, op::BIPUSH | op::SIPUSH) => {
            add_number(graph, owner, method, Number::Int(*v));
            InsnTarget::None
        }
        Operand::Ldc(Constant::String(s)) => {
            graph.methods[method.index()].strings.insert(s.clone());
            graph.classes[owner.index()].strings.insert(s.clone());
            InsnTarget::None
        }
        Operand::Ldc(Constant::Class(name)) => {
            let class = graph.resolve_internal(side, name)?;
            add_class_ref(graph, method, class);
            InsnTarget::Class(class)
        }
        Operand::Ldc(constant) => {
            if let Some(n) = number_of(constant) {
                add_number(graph, owner, method, n);
            }
            InsnTarget::None
        }
        Operand::Type(name) => {
            let class = graph.resolve_internal(side, name)?;
            add_class_ref(graph, method, class);
            InsnTarget::Class(class)
        }
        Operand::MultiANewArray { descriptor, .. } => {
            let class = graph.resolve_class(side, descriptor)?;
            add_class_ref(graph, method, class);
            InsnTarget::Class(class)
        }
        Operand::Field(member) => {
            let holder = graph.resolve_internal(side, &member.owner)?;
            let hint = match insn.opcode {
                op::GETSTATIC | op::PUTSTATIC => access::STATIC,
                _ => 0,
            };
            let field = graph.resolve_field(holder, &member.name, &member.descriptor, hint)?;
            if matches!(insn.opcode, op::GETSTATIC | op::GETFIELD) {
                graph.methods[method.index()].field_reads.insert(field);
                graph.fields[field.index()].read_refs.insert(method);
            } else {
                graph.methods[method.index()].field_writes.insert(field);
                graph.fields[field.index()].write_refs.insert(method);
            }
            InsnTarget::Field(field)
        }
        Operand::Method(member) => {
            let holder = graph.resolve_internal(side, &member.owner)?;
            let hint = if insn.opcode == op::INVOKESTATIC { access::STATIC } else { 0 };
            let callee = graph.resolve_method(holder, &member.name, &member.descriptor, hint)?;
            add_call(graph, method, callee, false);
            InsnTarget::Method(callee)
        }
        Operand::Dynamic(call) => match lambda_impl(call) {
            Some(handle) => {
                let holder = graph.resolve_internal(side, &handle.owner)?;
                let hint = if handle.kind == REF_INVOKE_STATIC { access::STATIC } else { 0 };
                let target = graph.resolve_method(holder, &handle.name, &handle.descriptor, hint)?;
                add_call(graph, method, target, true);
                InsnTarget::Method(target)
            }
            None => {
                debug!(
                    bootstrap = %format!("{}.{}", call.bootstrap.owner, call.bootstrap.name),
                    site = %call.name,
                    "unrecognized bootstrap method, no extra information"
                );
                InsnTarget::None
            }
        },
        _ => InsnTarget::None,
    };
    Ok(target)
}

fn add_number(graph: &mut ClassGraph, owner: ClassId, method: MethodId, n: Number) {
    graph.methods[method.index()].numbers.insert(n);
    graph.classes[owner.index()].numbers.insert(n);
}

fn add_class_ref(graph: &mut ClassGraph, method: MethodId, class: ClassId) {
    graph.methods[method.index()].class_refs.insert(class);
    graph.classes[class.index()].method_type_refs.insert(method);
}

fn add_call(graph: &mut ClassGraph, caller: MethodId, callee: MethodId, lambda: bool) {
    graph.methods[caller.index()].refs_out.insert(callee);
    let callee = &mut graph.methods[callee.index()];
    callee.refs_in.insert(caller);
    if lambda {
        callee.lambda_refs_in.insert(caller);
    } else {
        callee.direct_refs_in.insert(caller);
    }
}

/// Records the constant a static input field is initialized with, when evident.
///
/// Either the field carries a `ConstantValue` attribute, or its only writer is
/// the owner's `<clinit>`, which stores into it exactly once directly after a
/// constant push.
pub(super) fn detect_initializers(graph: &mut ClassGraph) {
    let mut found: Vec<(FieldId, Initializer)> = Vec::new();

    for side in [Side::A, Side::B] {
        for &class in graph.classes(side) {
            if !graph.class(class).is_input() {
                continue;
            }
            for field in graph.real_fields(class) {
                if let Some(init) = initializer_of(graph, class, field) {
                    found.push((field, init));
                }
            }
        }
    }

    for (field, init) in found {
        graph.fields[field.index()].initializer = Some(init);
    }
}

fn initializer_of(graph: &ClassGraph, class: ClassId, field: FieldId) -> Option<Initializer> {
    let f = graph.field(field);
    if !f.is_static() {
        return None;
    }

    let declared = graph
        .class(class)
        .body()
        .and_then(|b| b.fields.get(f.body_index?))
        .and_then(|info| info.constant_value.as_ref());
    if let Some(constant) = declared {
        return match constant {
            Constant::String(s) => Some(Initializer::String(s.clone())),
            other => number_of(other).map(Initializer::Number),
        };
    }

    let mut writers = f.write_refs.iter();
    let writer = *writers.next()?;
    if writers.next().is_some() {
        return None;
    }
    let w = graph.method(writer);
    if w.owner != class || w.name != "<clinit>" {
        return None;
    }

    let insns = graph.insns(writer);
    let mut stores = w
        .insn_targets
        .iter()
        .enumerate()
        .filter(|(i, t)| insns[*i].opcode == op::PUTSTATIC && **t == InsnTarget::Field(field))
        .map(|(i, _)| i);
    let store = stores.next()?;
    if stores.next().is_some() || store == 0 {
        return None;
    }

    let push = &insns[store - 1];
    match (&push.operand, push.opcode) {
        (Operand::None, op::ICONST_M1..=op::ICONST_5) => {
            Some(Initializer::Number(Number::Int(push.opcode as i32 - op::ICONST_M1 as i32 - 1)))
        }
        (Operand::None, op::LCONST_0..=op::LCONST_1) => {
            Some(Initializer::Number(Number::Long((push.opcode - op::LCONST_0) as i64)))
        }
        (Operand::None, op::FCONST_0..=op::FCONST_2) => {
            Some(Initializer::Number(Number::float((push.opcode - op::FCONST_0) as f32)))
        }
        (Operand::None, op::DCONST_0..=op::DCONST_1) => {
            Some(Initializer::Number(Number::double((push.opcode - op::DCONST_0) as f64)))
        }
        (Operand::Int(v), op::BIPUSH | op::SIPUSH) => Some(Initializer::Number(Number::Int(*v))),
        (Operand::Ldc(Constant::String(s)), _) => Some(Initializer::String(s.clone())),
        (Operand::Ldc(Constant::Class(_)), _) => match w.insn_targets[store - 1] {
            InsnTarget::Class(c) => Some(Initializer::Class(c)),
            _ => None,
        },
        (Operand::Ldc(constant), _) => number_of(constant).map(Initializer::Number),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::build_graph;
    use crate::graph::NamePatterns;
    use crate::testkit::ClassBuilder;

    #[test]
    fn calls_field_access_and_constants_are_wired() -> anyhow::Result<()> {
        let lib = ClassBuilder::new("lib/Lib")
            .method("run", "()V", access::PUBLIC | access::STATIC, |_| {})
            .build();
        let a = ClassBuilder::new("a")
            .field("f", "I", access::STATIC)
            .method("m", "()V", access::STATIC, |code| {
                code.invoke(op::INVOKESTATIC, "lib/Lib", "run", "()V")
                    .ldc(Constant::String("hello".into()))
                    .push_int(300)
                    .field_insn(op::PUTSTATIC, "a", "f", "I")
                    .field_insn(op::GETSTATIC, "a", "f", "I")
                    .type_insn(op::NEW, "a")
                    .op(op::RETURN);
            })
            .build();
        let b = ClassBuilder::new("b").build();
        let g = build_graph(NamePatterns::default(), vec![lib], vec![a], vec![b])?;

        let class = g.lookup(Side::A, "La;").expect("class a");
        let m = g.class(class).methods()[0];
        let f = g.class(class).fields()[0];
        let method = g.method(m);

        let run = method.refs_out().iter().next().copied().expect("call");
        assert_eq!(g.method_side(run), Side::Shared);
        assert!(g.method(run).refs_in().contains(&m));
        assert!(method.strings().contains("hello"));
        assert!(g.class(class).strings().contains("hello"));
        assert!(method.numbers().contains(&Number::Int(300)));
        assert!(method.field_reads().contains(&f));
        assert!(method.field_writes().contains(&f));
        assert!(g.field(f).read_refs().contains(&m));
        assert!(method.class_refs().contains(&class));
        assert_eq!(method.insn_targets.len(), 7);
        assert_eq!(method.insn_targets[0], InsnTarget::Method(run));
        Ok(())
    }

    #[test]
    fn clinit_constant_store_becomes_initializer() -> anyhow::Result<()> {
        let a = ClassBuilder::new("a")
            .field("f", "I", access::STATIC)
            .field("g", "Ljava/lang/String;", access::STATIC)
            .constant_field("h", "J", access::STATIC, Constant::Long(9))
            .method("<clinit>", "()V", access::STATIC, |code| {
                code.op(op::ICONST_5)
                    .field_insn(op::PUTSTATIC, "a", "f", "I")
                    .ldc(Constant::String("x".into()))
                    .field_insn(op::PUTSTATIC, "a", "g", "Ljava/lang/String;")
                    .op(op::RETURN);
            })
            .build();
        let g = build_graph(NamePatterns::default(), vec![], vec![a], vec![])?;
        let class = g.lookup(Side::A, "La;").expect("class a");
        let fields = g.class(class).fields();
        assert_eq!(g.field(fields[0]).initializer(), Some(&Initializer::Number(Number::Int(5))));
        assert_eq!(g.field(fields[1]).initializer(), Some(&Initializer::String("x".into())));
        assert_eq!(g.field(fields[2]).initializer(), Some(&Initializer::Number(Number::Long(9))));
        Ok(())
    }

    #[test]
    fn wide_constant_opcodes_become_initializers() -> anyhow::Result<()> {
        let a = ClassBuilder::new("a")
            .field("l", "J", access::STATIC)
            .field("f", "F", access::STATIC)
            .field("d", "D", access::STATIC)
            .method("<clinit>", "()V", access::STATIC, |code| {
                code.op(op::LCONST_1)
                    .field_insn(op::PUTSTATIC, "a", "l", "J")
                    .op(op::FCONST_2)
                    .field_insn(op::PUTSTATIC, "a", "f", "F")
                    .op(op::DCONST_0)
                    .field_insn(op::PUTSTATIC, "a", "d", "D")
                    .op(op::RETURN);
            })
            .build();
        let g = build_graph(NamePatterns::default(), vec![], vec![a], vec![])?;
        let class = g.lookup(Side::A, "La;").expect("class a");
        let fields = g.class(class).fields();
        assert_eq!(g.field(fields[0]).initializer(), Some(&Initializer::Number(Number::Long(1))));
        assert_eq!(g.field(fields[1]).initializer(), Some(&Initializer::Number(Number::float(2.0))));
        assert_eq!(g.field(fields[2]).initializer(), Some(&Initializer::Number(Number::double(0.0))));
        Ok(())
    }

    #[test]
    fn lambda_call_sites_target_the_implementation() -> anyhow::Result<()> {
        let a = ClassBuilder::new("a")
            .method("m", "()V", 0, |code| {
                code.lambda("run", "a", "lambda$m$0", "()V").op(op::RETURN);
            })
            .method(
                "lambda$m$0",
                "()V",
                access::PRIVATE | access::STATIC | access::SYNTHETIC,
                |_| {},
            )
            .build();
        let g = build_graph(NamePatterns::default(), vec![], vec![a], vec![])?;
        let class = g.lookup(Side::A, "La;").expect("class a");
        let (m, lambda) = (g.class(class).methods()[0], g.class(class).methods()[1]);
        assert!(g.method(m).refs_out().contains(&lambda));
        assert_eq!(g.method(lambda).kind(), crate::model::MethodKind::LambdaImpl);
        Ok(())
    }
}
