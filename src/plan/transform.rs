//! Plan tree traversals
//!
//! Visitor-style rewrites over the node tree. The closure returns `Some`
//! with a replacement or `None` to keep a node; every traversal reports
//! `None` when nothing changed so callers can short-circuit and rules stay
//! cheap at fixed point.

use super::Node;
use crate::error::Result;
use crate::expr::Expression;

/// Rewrite bottom-up: children first, then the node itself.
pub fn transform_up(
    node: &Node,
    f: &mut dyn FnMut(&Node) -> Result<Option<Node>>,
) -> Result<Option<Node>> {
    let mut new_children = Vec::new();
    let mut changed = false;
    for child in node.children() {
        match transform_up(child, f)? {
            Some(new_child) => {
                new_children.push(new_child);
                changed = true;
            }
            None => new_children.push(child.clone()),
        }
    }
    let rebuilt = if changed {
        node.with_children(new_children)?
    } else {
        node.clone()
    };
    match f(&rebuilt)? {
        Some(replaced) => Ok(Some(replaced)),
        None if changed => Ok(Some(rebuilt)),
        None => Ok(None),
    }
}

/// Rewrite top-down: the node first, then its (possibly new) children.
pub fn transform_down(
    node: &Node,
    f: &mut dyn FnMut(&Node) -> Result<Option<Node>>,
) -> Result<Option<Node>> {
    let (node, self_changed) = match f(node)? {
        Some(replaced) => (replaced, true),
        None => (node.clone(), false),
    };
    let mut new_children = Vec::new();
    let mut changed = false;
    for child in node.children() {
        match transform_down(child, f)? {
            Some(new_child) => {
                new_children.push(new_child);
                changed = true;
            }
            None => new_children.push(child.clone()),
        }
    }
    if changed {
        Ok(Some(node.with_children(new_children)?))
    } else if self_changed {
        Ok(Some(node))
    } else {
        Ok(None)
    }
}

/// Rewrite every expression of every node, bottom-up through both trees.
pub fn transform_expressions(
    node: &Node,
    f: &mut dyn FnMut(&Expression) -> Result<Option<Expression>>,
) -> Result<Option<Node>> {
    transform_up(node, &mut |n| {
        let mut new_exprs = Vec::new();
        let mut changed = false;
        for expr in n.expressions() {
            match expr.transform_up(f)? {
                Some(new_expr) => {
                    new_exprs.push(new_expr);
                    changed = true;
                }
                None => new_exprs.push(expr.clone()),
            }
        }
        if changed {
            Ok(Some(n.with_expressions(new_exprs)?))
        } else {
            Ok(None)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Expression;
    use crate::types::Value;

    fn sample() -> Node {
        Node::project(
            vec![Expression::column("a")],
            Node::filter(
                Expression::column("a").equals(Expression::literal(1i64)),
                Node::table("t"),
            ),
        )
    }

    #[test]
    fn test_transform_up_unchanged_is_none() -> Result<()> {
        let plan = sample();
        assert!(transform_up(&plan, &mut |_| Ok(None))?.is_none());
        assert!(transform_down(&plan, &mut |_| Ok(None))?.is_none());
        assert!(transform_expressions(&plan, &mut |_| Ok(None))?.is_none());
        Ok(())
    }

    #[test]
    fn test_transform_up_replaces_leaf() -> Result<()> {
        let plan = sample();
        let rewritten = transform_up(&plan, &mut |n| match n {
            Node::UnresolvedTable { name, .. } if name == "t" => Ok(Some(Node::Nothing)),
            _ => Ok(None),
        })?
        .expect("tree changed");
        // The filter's child is now the empty relation.
        let filter = rewritten.children()[0];
        assert!(matches!(filter.children()[0], Node::Nothing));
        Ok(())
    }

    #[test]
    fn test_transform_expressions_rewrites_in_place() -> Result<()> {
        let plan = sample();
        let rewritten = transform_expressions(&plan, &mut |e| match e {
            Expression::Literal(Value::I64(1)) => Ok(Some(Expression::literal(2i64))),
            _ => Ok(None),
        })?
        .expect("tree changed");
        let shown = format!("{rewritten}");
        assert!(shown.contains("= 2"), "plan was: {shown}");
        Ok(())
    }

    #[test]
    fn test_with_children_round_trip() -> Result<()> {
        let plan = sample();
        let children: Vec<Node> = plan.children().into_iter().cloned().collect();
        let rebuilt = plan.with_children(children)?;
        assert_eq!(format!("{plan:?}"), format!("{rebuilt:?}"));
        Ok(())
    }
}
