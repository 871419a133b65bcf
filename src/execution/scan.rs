//! Table scans and table functions

use std::collections::VecDeque;
use std::sync::Arc;

use super::{BoxedRowIter, RowIter};
use crate::catalog::{Partition, RowIterator, Table, TableFunction};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::expr::Expression;
use crate::types::Row;

/// A partition-by-partition scan. Tracked scans report partition and table
/// progress to the process list as they advance.
pub fn build_scan(
    ctx: &Context,
    table: &Arc<dyn Table>,
    _as_of: Option<&crate::types::Value>,
    tracked: bool,
) -> Result<BoxedRowIter> {
    let partitions: VecDeque<Partition> = table.partitions(ctx)?.into();
    Ok(Box::new(ScanIter {
        table: Arc::clone(table),
        partitions,
        current: None,
        tracked,
    }))
}

struct ScanIter {
    table: Arc<dyn Table>,
    partitions: VecDeque<Partition>,
    current: Option<(Partition, RowIterator)>,
    tracked: bool,
}

impl RowIter for ScanIter {
    fn next(&mut self, ctx: &Context) -> Option<Result<Row>> {
        loop {
            if self.current.is_none() {
                let partition = self.partitions.pop_front()?;
                // Cancellation is re-checked at every partition boundary.
                if let Err(e) = ctx.check_cancelled() {
                    return Some(Err(e));
                }
                if self.tracked {
                    ctx.add_partition_progress(self.table.name(), &partition.key, -1);
                }
                let rows = match self.table.partition_rows(ctx, &partition) {
                    Ok(rows) => rows,
                    Err(e) => return Some(Err(e)),
                };
                self.current = Some((partition, rows));
            }
            let (partition, rows) = self.current.as_mut()?;
            match rows.next() {
                Some(Ok(row)) => {
                    if self.tracked {
                        ctx.update_partition_progress(self.table.name(), &partition.key, 1);
                    }
                    return Some(Ok(row));
                }
                Some(Err(e)) => return Some(Err(e)),
                None => {
                    if self.tracked {
                        ctx.remove_partition_progress(self.table.name(), &partition.key);
                        ctx.update_table_progress(self.table.name(), 1);
                    }
                    self.current = None;
                }
            }
        }
    }

    fn close(&mut self, _ctx: &Context) -> Result<()> {
        self.current = None;
        self.partitions.clear();
        Ok(())
    }
}

pub fn build_table_function(
    ctx: &Context,
    name: &str,
    args: &[Expression],
    function: Option<&Arc<dyn TableFunction>>,
) -> Result<BoxedRowIter> {
    let function = function
        .ok_or_else(|| Error::Internal(format!("executing unresolved table function {name}")))?;
    let values: Vec<crate::types::Value> = args
        .iter()
        .map(|a| a.eval(ctx, &vec![]))
        .collect::<Result<_>>()?;
    let rows = function.rows(ctx, &values)?;
    Ok(Box::new(TableFunctionIter { rows: Some(rows) }))
}

struct TableFunctionIter {
    rows: Option<RowIterator>,
}

impl RowIter for TableFunctionIter {
    fn next(&mut self, _ctx: &Context) -> Option<Result<Row>> {
        self.rows.as_mut()?.next()
    }

    fn close(&mut self, _ctx: &Context) -> Result<()> {
        self.rows = None;
        Ok(())
    }
}
