//! Generator (EXPLODE) execution

use super::{build, BoxedRowIter, RowIter};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::expr::ColumnRef;
use crate::plan::Node;
use crate::types::{Row, Value};

/// Reads one input row at a time and emits one output row per element of
/// the array in the generator column, then advances to the next input row.
pub fn build_generate(ctx: &Context, column: &ColumnRef, child: &Node) -> Result<BoxedRowIter> {
    Ok(Box::new(GenerateIter {
        column: column.clone(),
        child: build(ctx, child)?,
        current: None,
    }))
}

struct GenerateIter {
    column: ColumnRef,
    child: BoxedRowIter,
    current: Option<(Row, std::vec::IntoIter<Value>)>,
}

impl RowIter for GenerateIter {
    fn next(&mut self, ctx: &Context) -> Option<Result<Row>> {
        loop {
            if let Some((row, elements)) = self.current.as_mut() {
                if let Some(element) = elements.next() {
                    let mut out = row.clone();
                    out[self.column.index] = element;
                    return Some(Ok(out));
                }
                self.current = None;
            }
            let row = match self.child.next(ctx)? {
                Ok(row) => row,
                Err(e) => return Some(Err(e)),
            };
            match row.get(self.column.index) {
                Some(Value::Array(items)) => {
                    self.current = Some((row.clone(), items.clone().into_iter()));
                }
                Some(Value::Null) => continue,
                Some(other) => {
                    return Some(Err(Error::ExplodeNotArray(other.type_name().to_string())))
                }
                None => {
                    return Some(Err(Error::Internal(format!(
                        "generator column {} out of bounds",
                        self.column.index
                    ))))
                }
            }
        }
    }

    fn close(&mut self, ctx: &Context) -> Result<()> {
        self.current = None;
        self.child.close(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::collect;
    use crate::expr::Expression;
    use crate::types::DataType;

    #[test]
    fn test_explode_unrolls_arrays() -> Result<()> {
        let ctx = Context::for_tests();
        let rows = vec![
            vec![Expression::Literal(Value::Array(vec![
                Value::I64(1),
                Value::I64(2),
                Value::I64(3),
            ]))],
            vec![Expression::Literal(Value::Array(vec![Value::I64(4)]))],
        ];
        let plan = Node::Generate {
            column: ColumnRef::new(0, "col", DataType::I64),
            child: Box::new(Node::Values { rows }),
        };
        let out = collect(&ctx, build(&ctx, &plan)?)?;
        assert_eq!(
            out,
            vec![
                vec![Value::I64(1)],
                vec![Value::I64(2)],
                vec![Value::I64(3)],
                vec![Value::I64(4)],
            ]
        );
        Ok(())
    }

    #[test]
    fn test_explode_of_non_array_errors() -> Result<()> {
        let ctx = Context::for_tests();
        let plan = Node::Generate {
            column: ColumnRef::new(0, "col", DataType::I64),
            child: Box::new(Node::Values {
                rows: vec![vec![Expression::literal(7i64)]],
            }),
        };
        let result = collect(&ctx, build(&ctx, &plan)?);
        assert!(matches!(result, Err(Error::ExplodeNotArray(_))));
        Ok(())
    }
}
