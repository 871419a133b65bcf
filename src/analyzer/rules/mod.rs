//! The default rule pipeline
//!
//! Batches run in the order below. Resolution runs to fixed point because
//! view expansion, procedure inlining and column resolution feed each
//! other; everything after it is a single pass, with process tracking and
//! final verification deferred until the plan is otherwise complete.

mod finalize;
mod resolve;
mod rewrite;

use super::{Batch, BatchPolicy, Rule};

pub(super) fn default_batches() -> Vec<Batch> {
    vec![
        Batch {
            name: "normalisation",
            policy: BatchPolicy::Once,
            rules: vec![Rule {
                id: "normalize_idents",
                apply: resolve::normalize_idents,
            }],
        },
        Batch {
            name: "resolution",
            policy: BatchPolicy::FixedPoint,
            rules: vec![
                Rule {
                    id: "resolve_tables",
                    apply: resolve::resolve_tables,
                },
                Rule {
                    id: "resolve_procedures",
                    apply: resolve::resolve_procedures,
                },
                Rule {
                    id: "resolve_triggers",
                    apply: resolve::resolve_triggers,
                },
                Rule {
                    id: "resolve_columns",
                    apply: resolve::resolve_columns,
                },
                Rule {
                    id: "resolve_functions",
                    apply: resolve::resolve_functions,
                },
            ],
        },
        Batch {
            name: "coercion",
            policy: BatchPolicy::Once,
            rules: vec![Rule {
                id: "coerce_types",
                apply: rewrite::coerce_types,
            }],
        },
        Batch {
            name: "subqueries",
            policy: BatchPolicy::Once,
            rules: vec![Rule {
                id: "convert_subqueries",
                apply: rewrite::convert_subqueries,
            }],
        },
        Batch {
            name: "pushdown",
            policy: BatchPolicy::Once,
            rules: vec![Rule {
                id: "pushdown",
                apply: rewrite::pushdown,
            }],
        },
        Batch {
            name: "indexes",
            policy: BatchPolicy::Once,
            rules: vec![Rule {
                id: "select_indexes",
                apply: rewrite::select_indexes,
            }],
        },
        Batch {
            name: "aggregation",
            policy: BatchPolicy::Once,
            rules: vec![
                Rule {
                    id: "validate_grouping",
                    apply: finalize::validate_grouping,
                },
                Rule {
                    id: "resolve_generators",
                    apply: finalize::resolve_generators,
                },
            ],
        },
        Batch {
            name: "process",
            policy: BatchPolicy::OnceAfter,
            rules: vec![Rule {
                id: "track_process",
                apply: finalize::track_process,
            }],
        },
        Batch {
            name: "validation",
            policy: BatchPolicy::OnceAfter,
            rules: vec![Rule {
                id: "ensure_resolved",
                apply: finalize::ensure_resolved,
            }],
        },
    ]
}
