//! Two-pass call resolution (§4.3). Pass 1 (at extraction time) emits
//! every call site as `unresolved`. Pass 2 runs after every File in a
//! re-index batch has been written, and upgrades each `CallsEdge` in
//! place against three widening scopes: same-file, imported symbols,
//! cross-file exports.

use crate::graph::schema::CallsEdge;
use crate::types::{CallResolution, EntityId};
use std::collections::HashMap;

/// Name resolution scopes available to pass 2, built by the caller from
/// the graph store's current contents for the files in this batch.
#[derive(Debug, Default)]
pub struct ResolutionContext {
    pub same_file_functions: HashMap<EntityId, HashMap<String, EntityId>>,
    pub imported_symbols: HashMap<EntityId, HashMap<String, EntityId>>,
    pub exported_symbols: HashMap<String, Vec<EntityId>>,
}

/// Reduces a raw callee expression (`foo.bar(1, 2)`, `self::helper()`,
/// `obj.method()`) to the bare trailing identifier pass 2 resolves by.
fn simple_callee_name(callee_text: &str) -> String {
    let before_call = callee_text.split('(').next().unwrap_or(callee_text);
    before_call
        .rsplit(['.', ':'])
        .find(|segment| !segment.is_empty())
        .unwrap_or(before_call)
        .trim()
        .to_string()
}

fn resolve_one(
    caller_id: &EntityId,
    callee_text: &str,
    ctx: &ResolutionContext,
) -> (Option<EntityId>, CallResolution) {
    let name = simple_callee_name(callee_text);

    if let Some(id) = ctx
        .same_file_functions
        .get(caller_id)
        .and_then(|scope| scope.get(&name))
    {
        return (Some(id.clone()), CallResolution::Exact);
    }
    if let Some(id) = ctx
        .imported_symbols
        .get(caller_id)
        .and_then(|scope| scope.get(&name))
    {
        return (Some(id.clone()), CallResolution::Exact);
    }
    match ctx.exported_symbols.get(&name) {
        Some(candidates) if candidates.len() == 1 => {
            (Some(candidates[0].clone()), CallResolution::Exact)
        }
        Some(candidates) if candidates.len() > 1 => (None, CallResolution::Ambiguous),
        _ => (None, CallResolution::Unresolved),
    }
}

/// Upgrades every edge in place; edges that remain unresolved keep
/// their raw `callee_text` for observability.
pub fn resolve_batch(calls: &mut [CallsEdge], ctx: &ResolutionContext) {
    for edge in calls.iter_mut() {
        let (callee_id, resolution) = resolve_one(&edge.caller_id, &edge.callee_text, ctx);
        edge.callee_id = callee_id;
        edge.resolution = resolution;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edge(caller: &str, callee_text: &str) -> CallsEdge {
        CallsEdge {
            caller_id: EntityId::new(caller.into()),
            callee_id: None,
            callee_text: callee_text.into(),
            call_site_line: 1,
            resolution: CallResolution::Unresolved,
        }
    }

    #[test]
    fn resolves_against_same_file_scope_first() {
        let caller = EntityId::new("caller".into());
        let target = EntityId::new("target".into());
        let mut ctx = ResolutionContext::default();
        ctx.same_file_functions
            .entry(caller.clone())
            .or_default()
            .insert("helper".into(), target.clone());

        let mut calls = vec![edge("caller", "helper()")];
        resolve_batch(&mut calls, &ctx);
        assert_eq!(calls[0].callee_id, Some(target));
        assert_eq!(calls[0].resolution, CallResolution::Exact);
    }

    #[test]
    fn ambiguous_cross_file_export_stays_unresolved_with_ambiguous_flag() {
        let mut ctx = ResolutionContext::default();
        ctx.exported_symbols.insert(
            "run".into(),
            vec![EntityId::new("a".into()), EntityId::new("b".into())],
        );

        let mut calls = vec![edge("caller", "run()")];
        resolve_batch(&mut calls, &ctx);
        assert_eq!(calls[0].callee_id, None);
        assert_eq!(calls[0].resolution, CallResolution::Ambiguous);
    }

    #[test]
    fn unknown_callee_remains_unresolved_and_retains_raw_text() {
        let ctx = ResolutionContext::default();
        let mut calls = vec![edge("caller", "mystery()")];
        resolve_batch(&mut calls, &ctx);
        assert_eq!(calls[0].resolution, CallResolution::Unresolved);
        assert_eq!(calls[0].callee_text, "mystery()");
    }

    #[test]
    fn strips_receiver_and_call_parens_from_callee_text() {
        assert_eq!(simple_callee_name("self.helper(1, 2)"), "helper");
        assert_eq!(simple_callee_name("module::func()"), "func");
        assert_eq!(simple_callee_name("bare_call()"), "bare_call");
    }
}
