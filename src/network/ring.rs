//! Consistent hash ring.
//!
//! Maps key hashes to server indices through virtual nodes, so adding or
//! removing a server only remaps about 1/N of the keys.

/// Virtual nodes per server
pub const POINTS_PER_SERVER: usize = 160;

/// Immutable ring of (point, server index) pairs
#[derive(Clone, Debug)]
pub struct HashRing {
    /// Sorted by point
    points: Box<[(u32, usize)]>,
    server_count: usize,
}

impl HashRing {
    /// Build a ring from server identities with equal weight.
    ///
    /// # Panics
    ///
    /// Panics if `servers` is empty.
    pub fn build<S: AsRef<str>>(servers: &[S]) -> Self {
        assert!(!servers.is_empty(), "HashRing needs at least one server");

        let mut points = Vec::with_capacity(servers.len() * POINTS_PER_SERVER);
        for (index, server) in servers.iter().enumerate() {
            for i in 0..POINTS_PER_SERVER {
                let point = crc32fast::hash(format!("{}-{}", server.as_ref(), i).as_bytes());
                points.push((point, index));
            }
        }
        points.sort_unstable();

        Self {
            points: points.into_boxed_slice(),
            server_count: servers.len(),
        }
    }

    /// Server index owning `hash`
    #[inline]
    pub fn route(&self, hash: u32) -> usize {
        if self.server_count <= 1 {
            return 0;
        }
        let idx = self.points.partition_point(|&(point, _)| point < hash);
        let idx = if idx == self.points.len() { 0 } else { idx };
        self.points[idx].1
    }

    pub fn server_count(&self) -> usize {
        self.server_count
    }

    pub fn point_count(&self) -> usize {
        self.points.len()
    }
}
