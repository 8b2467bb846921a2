use crate::error::{WorkflowError, WorkflowResult};
use crate::types::{Connection, Node, NodeId};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

/// DAG representation of a workflow graph
///
/// Node indices follow first-occurrence input order, which is what the
/// ordering uses to break ties.
pub struct WorkflowDag<'a> {
    graph: DiGraph<&'a Node, ()>,
    node_indices: HashMap<&'a str, NodeIndex>,
}

/// Nodes in execution order, with id lookup
#[derive(Debug, Clone)]
pub struct ExecutionOrder<'a> {
    nodes: Vec<&'a Node>,
    lookup: HashMap<&'a str, &'a Node>,
}

impl<'a> ExecutionOrder<'a> {
    fn new(nodes: Vec<&'a Node>) -> Self {
        let lookup = nodes.iter().map(|n| (n.id.as_str(), *n)).collect();
        Self { nodes, lookup }
    }

    pub fn nodes(&self) -> &[&'a Node] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: &NodeId) -> Option<&'a Node> {
        self.lookup.get(id.as_str()).copied()
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.iter().map(|n| n.id.clone()).collect()
    }

    /// Owned copies, for persisting as a step result
    pub fn to_owned_nodes(&self) -> Vec<Node> {
        self.nodes.iter().map(|n| (*n).clone()).collect()
    }
}

impl<'a> WorkflowDag<'a> {
    /// Build a DAG from a workflow's nodes and connections
    pub fn from_parts(nodes: &'a [Node], connections: &[Connection]) -> WorkflowResult<Self> {
        let mut graph = DiGraph::new();
        let mut node_indices = HashMap::new();

        for node in nodes {
            if node_indices.contains_key(node.id.as_str()) {
                tracing::warn!("Duplicate node {} in workflow graph, keeping first", node.id);
                continue;
            }
            let idx = graph.add_node(node);
            node_indices.insert(node.id.as_str(), idx);
        }

        for connection in connections {
            connection.validate_handles()?;

            let from = Self::endpoint(&graph, &node_indices, connection, &connection.from_node_id)?;
            let to = Self::endpoint(&graph, &node_indices, connection, &connection.to_node_id)?;

            // Edge from source to destination (from -> to)
            graph.add_edge(from, to, ());
        }

        Ok(Self {
            graph,
            node_indices,
        })
    }

    fn endpoint(
        graph: &DiGraph<&'a Node, ()>,
        node_indices: &HashMap<&'a str, NodeIndex>,
        connection: &Connection,
        node_id: &NodeId,
    ) -> WorkflowResult<NodeIndex> {
        let dangling = || WorkflowError::DanglingReference {
            connection_id: connection.id.clone(),
            node_id: node_id.clone(),
        };

        let idx = *node_indices.get(node_id.as_str()).ok_or_else(dangling)?;
        if graph[idx].workflow_id != connection.workflow_id {
            return Err(dangling());
        }
        Ok(idx)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Nodes in an order where every connection's source precedes its destination
    ///
    /// Ready nodes are taken in input order. Nodes without any connection are
    /// appended after the connected ones, also in input order.
    pub fn topological_order(&self) -> WorkflowResult<ExecutionOrder<'a>> {
        if self.graph.edge_count() == 0 {
            let nodes = self.graph.node_indices().map(|n| self.graph[n]).collect();
            return Ok(ExecutionOrder::new(nodes));
        }

        let (connected, isolated): (Vec<NodeIndex>, Vec<NodeIndex>) = self
            .graph
            .node_indices()
            .partition(|&n| self.graph.neighbors_undirected(n).next().is_some());

        let mut in_degree: HashMap<NodeIndex, usize> = connected
            .iter()
            .map(|&n| {
                let degree = self.graph.edges_directed(n, Direction::Incoming).count();
                (n, degree)
            })
            .collect();

        let mut ready: BinaryHeap<Reverse<NodeIndex>> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(&n, _)| Reverse(n))
            .collect();

        let mut ordered = Vec::with_capacity(self.graph.node_count());
        while let Some(Reverse(node)) = ready.pop() {
            ordered.push(self.graph[node]);

            // One decrement per edge, so parallel edges are counted correctly
            for edge in self.graph.edges_directed(node, Direction::Outgoing) {
                let target = edge.target();
                if let Some(degree) = in_degree.get_mut(&target) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.push(Reverse(target));
                    }
                }
            }
        }

        if ordered.len() < connected.len() {
            return Err(WorkflowError::CyclicWorkflow {
                node: self.cycle_member(),
            });
        }

        ordered.extend(isolated.into_iter().map(|n| self.graph[n]));
        Ok(ExecutionOrder::new(ordered))
    }

    /// Lowest-indexed node that sits on a cycle
    fn cycle_member(&self) -> NodeId {
        petgraph::algo::tarjan_scc(&self.graph)
            .into_iter()
            .filter(|scc| scc.len() > 1 || self.graph.contains_edge(scc[0], scc[0]))
            .flatten()
            .min()
            .map(|n| self.graph[n].id.clone())
            .unwrap_or_else(|| NodeId::new("<unknown>"))
    }

    /// Direct predecessors of a node
    pub fn dependencies(&self, node_id: &NodeId) -> Vec<NodeId> {
        self.node_indices
            .get(node_id.as_str())
            .map(|&idx| {
                self.graph
                    .neighbors_directed(idx, Direction::Incoming)
                    .map(|n| self.graph[n].id.clone())
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Order a workflow's nodes for sequential execution
pub fn topological_sort<'a>(
    nodes: &'a [Node],
    connections: &[Connection],
) -> WorkflowResult<ExecutionOrder<'a>> {
    WorkflowDag::from_parts(nodes, connections)?.topological_order()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NodeType, WorkflowGraph, WorkflowId};

    fn ids(order: &ExecutionOrder<'_>) -> Vec<String> {
        order.nodes().iter().map(|n| n.id.0.clone()).collect()
    }

    fn position(order: &[String], id: &str) -> usize {
        order.iter().position(|n| n == id).unwrap()
    }

    #[test]
    fn test_linear_dag() {
        let wf = WorkflowGraph::new("wf")
            .node("step3", NodeType::HttpRequest)
            .node("step1", NodeType::ManualTrigger)
            .node("step2", NodeType::HttpRequest)
            .connect("step1", "step2")
            .connect("step2", "step3");

        let order = topological_sort(&wf.nodes, &wf.connections).unwrap();
        assert_eq!(ids(&order), vec!["step1", "step2", "step3"]);
    }

    #[test]
    fn test_no_connections_keeps_input_order() {
        let wf = WorkflowGraph::new("wf")
            .node("c", NodeType::HttpRequest)
            .node("a", NodeType::ManualTrigger)
            .node("b", NodeType::HttpRequest);

        let order = topological_sort(&wf.nodes, &wf.connections).unwrap();
        assert_eq!(ids(&order), vec!["c", "a", "b"]);
    }

    #[test]
    fn test_ties_broken_by_input_order() {
        // Diamond: t -> {x, y} -> z, with y listed before x
        let wf = WorkflowGraph::new("wf")
            .node("t", NodeType::ManualTrigger)
            .node("y", NodeType::HttpRequest)
            .node("x", NodeType::HttpRequest)
            .node("z", NodeType::HttpRequest)
            .connect("t", "x")
            .connect("t", "y")
            .connect("x", "z")
            .connect("y", "z");

        let order = topological_sort(&wf.nodes, &wf.connections).unwrap();
        assert_eq!(ids(&order), vec!["t", "y", "x", "z"]);
    }

    #[test]
    fn test_isolated_nodes_appended_in_input_order() {
        let wf = WorkflowGraph::new("wf")
            .node("lonely1", NodeType::HttpRequest)
            .node("b", NodeType::HttpRequest)
            .node("lonely2", NodeType::HttpRequest)
            .node("a", NodeType::ManualTrigger)
            .connect("a", "b");

        let order = topological_sort(&wf.nodes, &wf.connections).unwrap();
        assert_eq!(ids(&order), vec!["a", "b", "lonely1", "lonely2"]);
    }

    #[test]
    fn test_every_node_once_and_edges_respected() {
        let wf = WorkflowGraph::new("wf")
            .node("e", NodeType::HttpRequest)
            .node("d", NodeType::HttpRequest)
            .node("c", NodeType::HttpRequest)
            .node("b", NodeType::HttpRequest)
            .node("a", NodeType::ManualTrigger)
            .node("solo", NodeType::HttpRequest)
            .connect("a", "b")
            .connect("a", "c")
            .connect("c", "d")
            .connect("b", "d")
            .connect("d", "e")
            .connect("a", "e")
            // parallel edge between the same pair
            .connect("a", "b");

        let order = topological_sort(&wf.nodes, &wf.connections).unwrap();
        let sorted = ids(&order);

        assert_eq!(sorted.len(), wf.nodes.len());
        let mut unique = sorted.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(unique.len(), wf.nodes.len());

        for conn in &wf.connections {
            assert!(
                position(&sorted, conn.from_node_id.as_str())
                    < position(&sorted, conn.to_node_id.as_str()),
                "{} must precede {}",
                conn.from_node_id,
                conn.to_node_id
            );
        }

        // Same input, same output
        let again = topological_sort(&wf.nodes, &wf.connections).unwrap();
        assert_eq!(ids(&again), sorted);
    }

    #[test]
    fn test_lookup_returns_input_references() {
        let wf = WorkflowGraph::new("wf")
            .node("a", NodeType::ManualTrigger)
            .node("b", NodeType::HttpRequest)
            .connect("a", "b");

        let order = topological_sort(&wf.nodes, &wf.connections).unwrap();
        let b = order.get(&NodeId::new("b")).unwrap();
        assert!(std::ptr::eq(b, &wf.nodes[1]));
        assert!(order.get(&NodeId::new("missing")).is_none());
    }

    #[test]
    fn test_duplicate_node_ids_collapsed() {
        let mut wf = WorkflowGraph::new("wf")
            .node("a", NodeType::ManualTrigger)
            .node("b", NodeType::HttpRequest)
            .connect("a", "b");
        wf.nodes.push(Node::new("a", &wf.id, NodeType::HttpRequest));

        let order = topological_sort(&wf.nodes, &wf.connections).unwrap();
        assert_eq!(ids(&order), vec!["a", "b"]);
        assert_eq!(order.nodes()[0].node_type, NodeType::ManualTrigger);
    }

    #[test]
    fn test_cyclic_dag_rejected() {
        let wf = WorkflowGraph::new("wf")
            .node("A", NodeType::ManualTrigger)
            .node("B", NodeType::HttpRequest)
            .connect("A", "B")
            .connect("B", "A");

        let result = topological_sort(&wf.nodes, &wf.connections);
        match result {
            Err(WorkflowError::CyclicWorkflow { node }) => assert_eq!(node.as_str(), "A"),
            other => panic!("expected cycle error, got {:?}", other.map(|o| o.node_ids())),
        }
    }

    #[test]
    fn test_cycle_downstream_of_acyclic_prefix() {
        let wf = WorkflowGraph::new("wf")
            .node("start", NodeType::ManualTrigger)
            .node("x", NodeType::HttpRequest)
            .node("y", NodeType::HttpRequest)
            .connect("start", "x")
            .connect("x", "y")
            .connect("y", "x");

        match topological_sort(&wf.nodes, &wf.connections) {
            Err(WorkflowError::CyclicWorkflow { node }) => assert_eq!(node.as_str(), "x"),
            _ => panic!("expected cycle error"),
        }
    }

    #[test]
    fn test_self_loop_is_a_cycle() {
        let wf = WorkflowGraph::new("wf")
            .node("a", NodeType::ManualTrigger)
            .connect("a", "a");

        assert!(matches!(
            topological_sort(&wf.nodes, &wf.connections),
            Err(WorkflowError::CyclicWorkflow { .. })
        ));
    }

    #[test]
    fn test_dangling_reference_rejected() {
        let wf = WorkflowGraph::new("wf")
            .node("a", NodeType::ManualTrigger)
            .connect("a", "ghost");

        match topological_sort(&wf.nodes, &wf.connections) {
            Err(WorkflowError::DanglingReference { node_id, .. }) => {
                assert_eq!(node_id.as_str(), "ghost")
            }
            _ => panic!("expected dangling reference"),
        }
    }

    #[test]
    fn test_invalid_handle_rejected() {
        let mut wf = WorkflowGraph::new("wf")
            .node("a", NodeType::ManualTrigger)
            .node("b", NodeType::HttpRequest)
            .connect("a", "b");
        wf.connections[0].to_input = "in put".to_string();

        assert!(matches!(
            topological_sort(&wf.nodes, &wf.connections),
            Err(WorkflowError::InvalidHandle { .. })
        ));
    }

    #[test]
    fn test_cross_workflow_connection_rejected() {
        let mut wf = WorkflowGraph::new("wf")
            .node("a", NodeType::ManualTrigger)
            .node("b", NodeType::HttpRequest);
        wf.connections
            .push(Connection::new(&WorkflowId::new("other"), "a", "b"));

        assert!(matches!(
            topological_sort(&wf.nodes, &wf.connections),
            Err(WorkflowError::DanglingReference { .. })
        ));
    }

    #[test]
    fn test_dependencies() {
        let wf = WorkflowGraph::new("wf")
            .node("a", NodeType::ManualTrigger)
            .node("b", NodeType::HttpRequest)
            .node("c", NodeType::HttpRequest)
            .connect("a", "c")
            .connect("b", "c");

        let dag = WorkflowDag::from_parts(&wf.nodes, &wf.connections).unwrap();
        let mut deps = dag.dependencies(&NodeId::new("c"));
        deps.sort();
        assert_eq!(deps, vec![NodeId::new("a"), NodeId::new("b")]);
        assert!(dag.dependencies(&NodeId::new("a")).is_empty());
        assert_eq!(dag.node_count(), 3);
    }
}
