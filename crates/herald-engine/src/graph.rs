use herald_core::{ReviewAction, RunState};

/// One stage of the workflow pipeline.
///
/// Nodes are pure state-transition functions invoked by the driver; the edges
/// between them live in [`Node::next`] so routing is a matter of matching on
/// enum values rather than dispatching on strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Node {
    /// Turn a free-text prompt into a structured request.
    InterpretRequest,
    /// Select the workflow for the request.
    RouteRequest,
    /// Capture directives and evaluate tenant policy.
    PolicyCheck,
    /// Hydrate context from the memory layer.
    FetchContext,
    /// Build the action plan.
    PlanActions,
    /// Produce the reasoning reflection.
    AgentReflection,
    /// Choose the dispatch plugin.
    SelectPlugin,
    /// Render the outbound message body.
    RenderPayload,
    /// Dispatch through the selected plugin.
    ExecutePlugin,
    /// Sentinel review of the run so far.
    ReviewOutcome,
    /// Retry-vs-complete decision.
    ReviewAgent,
    /// Prepare and commit memory updates.
    UpdateMemory,
    /// Terminal bookkeeping.
    Finalize,
}

/// Where the driver goes after a node finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Continue with the given node.
    Goto(Node),
    /// The run is finished.
    End,
}

impl Node {
    /// The first node for a run: interpretation when only a raw prompt is
    /// present, routing otherwise.
    pub fn entry(state: &RunState) -> Node {
        if state.request.is_some() {
            Node::RouteRequest
        } else {
            Node::InterpretRequest
        }
    }

    /// The transition taken after this node, given the merged state.
    ///
    /// Two edges are conditional: rendering only proceeds to dispatch when a
    /// plugin was selected, and the review agent's decision picks between the
    /// retry edge (back to routing) and completion.
    pub fn next(self, state: &RunState) -> Transition {
        match self {
            Node::InterpretRequest => Transition::Goto(Node::RouteRequest),
            Node::RouteRequest => Transition::Goto(Node::PolicyCheck),
            Node::PolicyCheck => Transition::Goto(Node::FetchContext),
            Node::FetchContext => Transition::Goto(Node::PlanActions),
            Node::PlanActions => Transition::Goto(Node::AgentReflection),
            Node::AgentReflection => Transition::Goto(Node::SelectPlugin),
            Node::SelectPlugin => Transition::Goto(Node::RenderPayload),
            Node::RenderPayload => {
                if state.selected_plugin.is_some() {
                    Transition::Goto(Node::ExecutePlugin)
                } else {
                    Transition::Goto(Node::ReviewOutcome)
                }
            }
            Node::ExecutePlugin => Transition::Goto(Node::ReviewOutcome),
            Node::ReviewOutcome => Transition::Goto(Node::ReviewAgent),
            Node::ReviewAgent => match state.review_action {
                Some(ReviewAction::Retry) => Transition::Goto(Node::RouteRequest),
                _ => Transition::Goto(Node::UpdateMemory),
            },
            Node::UpdateMemory => Transition::Goto(Node::Finalize),
            Node::Finalize => Transition::End,
        }
    }

    /// Stable node name used in logs.
    pub fn name(self) -> &'static str {
        match self {
            Node::InterpretRequest => "interpret_request",
            Node::RouteRequest => "route_request",
            Node::PolicyCheck => "policy_check",
            Node::FetchContext => "fetch_context",
            Node::PlanActions => "plan_actions",
            Node::AgentReflection => "agent_reflection",
            Node::SelectPlugin => "select_plugin",
            Node::RenderPayload => "render_payload",
            Node::ExecutePlugin => "execute_plugin",
            Node::ReviewOutcome => "review_outcome",
            Node::ReviewAgent => "review_agent",
            Node::UpdateMemory => "update_memory",
            Node::Finalize => "finalize",
        }
    }
}

impl std::fmt::Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use herald_core::TaskRequest;
    use serde_json::Map;

    fn state() -> RunState {
        RunState::new(TaskRequest::new("send_update"))
    }

    #[test]
    fn test_entry_depends_on_request() {
        assert_eq!(Node::entry(&state()), Node::RouteRequest);
        let prompted = RunState::from_prompt("do the thing", Map::new());
        assert_eq!(Node::entry(&prompted), Node::InterpretRequest);
    }

    #[test]
    fn test_render_skips_dispatch_without_plugin() {
        let mut state = state();
        assert_eq!(
            Node::RenderPayload.next(&state),
            Transition::Goto(Node::ReviewOutcome)
        );
        state.selected_plugin = Some("demo-messaging".to_string());
        assert_eq!(
            Node::RenderPayload.next(&state),
            Transition::Goto(Node::ExecutePlugin)
        );
    }

    #[test]
    fn test_review_agent_edge_follows_action() {
        let mut state = state();
        state.review_action = Some(ReviewAction::Retry);
        assert_eq!(
            Node::ReviewAgent.next(&state),
            Transition::Goto(Node::RouteRequest)
        );
        state.review_action = Some(ReviewAction::Complete);
        assert_eq!(
            Node::ReviewAgent.next(&state),
            Transition::Goto(Node::UpdateMemory)
        );
        // A missing decision falls through to completion.
        state.review_action = None;
        assert_eq!(
            Node::ReviewAgent.next(&state),
            Transition::Goto(Node::UpdateMemory)
        );
    }

    #[test]
    fn test_happy_path_reaches_end() {
        let mut state = state();
        state.selected_plugin = Some("demo-messaging".to_string());
        state.review_action = Some(ReviewAction::Complete);

        let mut node = Node::entry(&state);
        let mut visited = vec![node];
        while let Transition::Goto(next) = node.next(&state) {
            node = next;
            visited.push(node);
            assert!(visited.len() <= 16, "graph must terminate");
        }
        assert_eq!(node, Node::Finalize);
        assert!(visited.contains(&Node::ExecutePlugin));
    }
}
