use libp2p::{identify, mdns, swarm::NetworkBehaviour};

/// Composed [`NetworkBehaviour`] for the scatter LAN mesh.
///
/// The `#[derive(NetworkBehaviour)]` macro generates `MeshBehaviourEvent`
/// with variants:
/// - `Mdns(mdns::Event)`
/// - `Identify(identify::Event)`
/// - `Stream(())` — the stream behaviour surfaces no swarm events; inbound
///   and outbound shard-transfer streams flow through its `Control` handle
///   instead.
#[derive(NetworkBehaviour)]
pub struct MeshBehaviour {
    pub mdns: mdns::tokio::Behaviour,
    pub identify: identify::Behaviour,
    pub stream: libp2p_stream::Behaviour,
}
