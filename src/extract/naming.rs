use crate::graph::ClassGraph;
use crate::model::{ClassId, MethodId, Side};

/// Gives obfuscated entities sequential, kind-prefixed display names.
///
/// Counters run per side in graph insertion order. Methods of one hierarchy
/// group share a name.
pub(super) fn assign_tmp_names(graph: &mut ClassGraph) {
    for side in [Side::A, Side::B] {
        let classes: Vec<ClassId> = graph
            .classes(side)
            .iter()
            .copied()
            .filter(|c| !graph.class(*c).is_array())
            .collect();

        let mut next_class = 0;
        for &class in &classes {
            if graph.class(class).is_name_obfuscated() {
                next_class += 1;
                graph.classes[class.index()].names.tmp = Some(format!("class_{next_class}"));
            }
        }

        let (mut next_method, mut next_field, mut next_arg, mut next_var) = (0, 0, 0, 0);
        for &class in &classes {
            let methods = graph.class(class).methods().to_vec();
            for method in methods {
                if graph.method(method).is_name_obfuscated() && graph.method(method).names.tmp.is_none() {
                    let name = match group_tmp_name(graph, method) {
                        Some(name) => name,
                        None => {
                            next_method += 1;
                            format!("method_{next_method}")
                        }
                    };
                    graph.methods[method.index()].names.tmp = Some(name);
                }

                let m = graph.method(method);
                let vars: Vec<_> = m.args().iter().chain(m.vars().iter()).copied().collect();
                for var in vars {
                    let v = &mut graph.vars[var.index()];
                    if !v.name_obfuscated {
                        continue;
                    }
                    v.names.tmp = Some(if v.is_arg {
                        next_arg += 1;
                        format!("arg_{next_arg}")
                    } else {
                        next_var += 1;
                        format!("var_{next_var}")
                    });
                }
            }

            let fields = graph.class(class).fields().to_vec();
            for field in fields {
                if graph.field(field).is_name_obfuscated() {
                    next_field += 1;
                    graph.fields[field.index()].names.tmp = Some(format!("field_{next_field}"));
                }
            }
        }
    }
}

fn group_tmp_name(graph: &ClassGraph, method: MethodId) -> Option<String> {
    graph
        .group(graph.method(method).group())
        .iter()
        .find_map(|m| graph.method(*m).names.tmp.clone())
}

#[cfg(test)]
mod tests {
    use crate::extract::build_graph;
    use crate::graph::NamePatterns;
    use crate::model::Side;
    use crate::testkit::ClassBuilder;

    #[test]
    fn tmp_names_follow_insertion_order_and_groups() -> anyhow::Result<()> {
        let p = ClassBuilder::new("p").method("m", "(I)V", 0, |_| {}).build();
        let c = ClassBuilder::new("c")
            .super_class("p")
            .method("m", "(I)V", 0, |_| {})
            .method("n", "()V", 0, |_| {})
            .field("f", "I", 0)
            .build();
        let patterns = NamePatterns::new(Some("c"), None, None, None)?;
        let g = build_graph(patterns, vec![], vec![p, c], vec![])?;

        let p = g.lookup(Side::A, "Lp;").expect("p");
        let c = g.lookup(Side::A, "Lc;").expect("c");
        assert_eq!(g.class(p).names().tmp(), Some("class_1"));
        assert_eq!(g.class(c).names().tmp(), None);

        let pm = g.class(p).methods()[0];
        let cm = g.class(c).methods()[0];
        let cn = g.class(c).methods()[1];
        assert_eq!(g.method(pm).names().tmp(), Some("method_1"));
        assert_eq!(g.method(cm).names().tmp(), Some("method_1"));
        assert_eq!(g.method(cn).names().tmp(), Some("method_2"));
        assert_eq!(g.field(g.class(c).fields()[0]).names().tmp(), Some("field_1"));
        assert_eq!(g.var(g.method(pm).args()[0]).names().tmp(), Some("arg_1"));
        assert_eq!(g.var(g.method(cm).args()[0]).names().tmp(), Some("arg_2"));
        Ok(())
    }
}
