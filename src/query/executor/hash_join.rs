use std::collections::HashMap;
use std::sync::Arc;

use crate::catalog::{Schema, Value};
use crate::common::types::Rid;
use crate::query::executor::{ExecResult, Executor, ExecutorContext};
use crate::query::plan::HashJoinPlan;
use crate::storage::table::Tuple;

/// Blocking build-then-probe equi-join. init() drains the left child into a
/// hash table keyed by the left join expression, then probes it with every
/// right tuple and materializes the full output; next() replays the
/// materialized tuples in order. Both sides fit in memory; there is no
/// spill.
pub struct HashJoinExecutor {
    #[allow(dead_code)]
    ctx: Arc<ExecutorContext>,
    plan: HashJoinPlan,
    left: Box<dyn Executor>,
    right: Box<dyn Executor>,
    results: Vec<Tuple>,
    cursor: usize,
}

impl HashJoinExecutor {
    pub fn new(
        ctx: Arc<ExecutorContext>,
        plan: HashJoinPlan,
        left: Box<dyn Executor>,
        right: Box<dyn Executor>,
    ) -> Self {
        Self {
            ctx,
            plan,
            left,
            right,
            results: Vec::new(),
            cursor: 0,
        }
    }
}

impl Executor for HashJoinExecutor {
    fn init(&mut self) -> ExecResult<()> {
        self.left.init()?;
        self.right.init()?;
        self.results.clear();
        self.cursor = 0;

        // Build side: left child, grouped by join key.
        let mut build_table: HashMap<Value, Vec<Tuple>> = HashMap::new();
        while let Some((tuple, _rid)) = self.left.next()? {
            let key = self.plan.left_key.evaluate(&tuple, self.left.output_schema());
            build_table.entry(key).or_default().push(tuple);
        }

        // Probe side: right child, materializing one output tuple per match.
        while let Some((right_tuple, _rid)) = self.right.next()? {
            let key = self
                .plan
                .right_key
                .evaluate(&right_tuple, self.right.output_schema());
            let matches = match build_table.get(&key) {
                Some(matches) => matches,
                None => continue,
            };
            for left_tuple in matches {
                let values = self
                    .plan
                    .output_exprs
                    .iter()
                    .map(|expr| {
                        expr.evaluate_join(
                            left_tuple,
                            self.left.output_schema(),
                            &right_tuple,
                            self.right.output_schema(),
                        )
                    })
                    .collect();
                self.results.push(Tuple::new(values));
            }
        }
        Ok(())
    }

    fn next(&mut self) -> ExecResult<Option<(Tuple, Rid)>> {
        if self.cursor < self.results.len() {
            let tuple = self.results[self.cursor].clone();
            self.cursor += 1;
            return Ok(Some((tuple, Rid::invalid())));
        }
        Ok(None)
    }

    fn output_schema(&self) -> &Schema {
        &self.plan.output_schema
    }
}
