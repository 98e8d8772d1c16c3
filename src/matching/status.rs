use serde::Serialize;

use super::table::MatchTable;
use crate::graph::ClassGraph;
use crate::model::Side;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KindStatus {
    pub matched: usize,
    pub total: usize,
}

impl KindStatus {
    fn count(&mut self, matched: bool) {
        self.total += 1;
        if matched {
            self.matched += 1;
        }
    }
}

/// Matched/total counts per entity kind, counted over side A.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MatchStatus {
    pub classes: KindStatus,
    pub methods: KindStatus,
    pub fields: KindStatus,
    pub args: KindStatus,
    pub vars: KindStatus,
}

impl MatchStatus {
    /// Counts real side A classes and their members; `inputs_only` skips classpath classes.
    pub fn collect(graph: &ClassGraph, table: &MatchTable, inputs_only: bool) -> Self {
        let mut status = Self::default();
        for &class in graph.classes(Side::A) {
            let c = graph.class(class);
            if !c.is_real() || c.is_array() || (inputs_only && !c.is_input()) {
                continue;
            }
            status.classes.count(table.class(class).is_some());

            for method in graph.real_methods(class) {
                status.methods.count(table.method(method).is_some());
                let m = graph.method(method);
                for &arg in m.args() {
                    status.args.count(table.var(arg).is_some());
                }
                for &var in m.vars() {
                    status.vars.count(table.var(var).is_some());
                }
            }
            for field in graph.real_fields(class) {
                status.fields.count(table.field(field).is_some());
            }
        }
        status
    }
}
