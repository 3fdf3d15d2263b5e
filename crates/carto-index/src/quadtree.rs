use std::cmp::Ordering;

use carto_types::{Geometry, Position, Rect, WORLD_BOUNDS};

/// Tuning for bucket splitting.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct IndexConfig {
    /// Slots a bucket holds before it splits into a quad.
    pub bucket_capacity: usize,
    /// Minimum quadrant span per axis, in degrees. A bucket whose cell is
    /// narrower than this grows unbounded instead of splitting, which keeps
    /// co-located entries from recursing forever.
    pub latitude_accuracy: f64,
    pub longitude_accuracy: f64,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            bucket_capacity: 50,
            latitude_accuracy: 0.001,
            longitude_accuracy: 0.001,
        }
    }
}

/// One indexed entry: a record key at a position.
#[derive(Clone, Debug, PartialEq)]
pub struct Slot {
    pub key: String,
    pub position: Position,
}

/// A single search result.
#[derive(Clone, Debug, PartialEq)]
pub enum SearchHit {
    /// A matching entry with its distance from the query center.
    Entry {
        key: String,
        position: Position,
        distance: f64,
    },
    /// A dense subtree summarized instead of enumerated (epsilon clustering).
    Cluster {
        center: Position,
        radius: f64,
        children: usize,
    },
}

/// Result of a spatial search. When `overflow` is set the limit was
/// exhausted before the traversal finished and `hits` is incomplete.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SearchOutcome {
    pub hits: Vec<SearchHit>,
    pub overflow: bool,
}

enum Node {
    Bucket(Vec<Slot>),
    Quad {
        children: Box<[Node; 4]>,
        /// Total slots in this subtree.
        slots: usize,
    },
}

impl Node {
    fn empty_bucket() -> Self {
        Node::Bucket(Vec::new())
    }

    fn slot_count(&self) -> usize {
        match self {
            Node::Bucket(slots) => slots.len(),
            Node::Quad { slots, .. } => *slots,
        }
    }
}

/// Adaptive quadtree over the world bounds.
///
/// Keys are unique per tree: callers reindex a moved entry by removing the
/// old slot (at its stored position) before inserting the new one.
pub struct QuadTree {
    root: Node,
    bounds: Rect,
    geometry: Geometry,
    config: IndexConfig,
    len: usize,
}

impl QuadTree {
    pub fn new(geometry: Geometry, config: IndexConfig) -> Self {
        Self {
            root: Node::empty_bucket(),
            bounds: WORLD_BOUNDS,
            geometry,
            config,
            len: 0,
        }
    }

    /// Number of indexed slots.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn bounds(&self) -> Rect {
        self.bounds
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    pub fn config(&self) -> IndexConfig {
        self.config
    }

    /// Index `key` at `position`.
    pub fn insert(&mut self, key: impl Into<String>, position: Position) {
        let slot = Slot {
            key: key.into(),
            position,
        };
        insert_at(&mut self.root, self.bounds, slot, &self.config);
        self.len += 1;
    }

    /// Remove the slot for `key`, descending by its stored `position`.
    /// Returns `false` if no slot was found on that path.
    pub fn remove(&mut self, key: &str, position: Position) -> bool {
        let removed = remove_at(&mut self.root, self.bounds, key, position, &self.config);
        if removed {
            self.len -= 1;
        }
        removed
    }

    /// All entries within `radius` of `center`, nearest first. A radius of
    /// zero is an exact-position lookup. Distances follow the tree's
    /// geometry: meters for geodetic layers, coordinate units otherwise.
    pub fn find_near(&self, center: Position, radius: f64, limit: usize) -> SearchOutcome {
        let (dlat, dlon) = if radius > 0.0 {
            self.geometry.degree_radius(center, radius)
        } else {
            // Exact lookup: a sliver wide enough to keep the zone half-open
            // containment from rejecting the center itself.
            (1e-9, 1e-9)
        };
        let candidate = Rect::new(
            center.latitude - dlat,
            center.longitude - dlon,
            center.latitude + dlat,
            center.longitude + dlon,
        );

        let mut out = SearchOutcome::default();
        for zone in wrap_zones(candidate, self.geometry.kind.wraps()) {
            collect_near(
                &self.root,
                self.bounds,
                &zone,
                center,
                radius,
                limit,
                &self.geometry,
                &mut out,
            );
            if out.overflow {
                break;
            }
        }
        sort_hits(&mut out.hits);
        out
    }

    /// All entries inside `rect` (half-open), with distances measured from
    /// the rect center. With `epsilon` set, subtrees denser than `limit / 4`
    /// inside a cell narrower than epsilon are reported as clusters.
    pub fn find_in_rect(
        &self,
        rect: Rect,
        limit: usize,
        epsilon: Option<f64>,
    ) -> SearchOutcome {
        let center = rect.center();
        let mut out = SearchOutcome::default();
        collect_in_rect(
            &self.root,
            self.bounds,
            &rect,
            center,
            limit,
            epsilon,
            &self.geometry,
            &mut out,
        );
        sort_hits(&mut out.hits);
        out
    }
}

impl std::fmt::Debug for QuadTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuadTree")
            .field("len", &self.len)
            .field("geometry", &self.geometry)
            .finish()
    }
}

fn insert_at(node: &mut Node, rect: Rect, slot: Slot, config: &IndexConfig) {
    match node {
        Node::Bucket(slots) => {
            let at_floor = rect.lat_span() < config.latitude_accuracy
                || rect.lon_span() < config.longitude_accuracy;
            if slots.len() < config.bucket_capacity || at_floor {
                slots.push(slot);
                return;
            }
            // Split: redistribute into four child buckets, then descend.
            let mut children = Box::new([
                Node::empty_bucket(),
                Node::empty_bucket(),
                Node::empty_bucket(),
                Node::empty_bucket(),
            ]);
            let total = slots.len();
            for existing in slots.drain(..) {
                let idx = rect.child_index(existing.position);
                if let Node::Bucket(bucket) = &mut children[idx] {
                    bucket.push(existing);
                }
            }
            *node = Node::Quad {
                children,
                slots: total,
            };
            insert_at(node, rect, slot, config);
        }
        Node::Quad { children, slots } => {
            *slots += 1;
            let idx = rect.child_index(slot.position);
            let child_rect = rect.quadrants()[idx];
            insert_at(&mut children[idx], child_rect, slot, config);
        }
    }
}

fn remove_at(
    node: &mut Node,
    rect: Rect,
    key: &str,
    position: Position,
    config: &IndexConfig,
) -> bool {
    match node {
        Node::Bucket(slots) => {
            if let Some(i) = slots.iter().position(|s| s.key == key) {
                slots.swap_remove(i);
                true
            } else {
                false
            }
        }
        Node::Quad { children, slots } => {
            let idx = rect.child_index(position);
            let child_rect = rect.quadrants()[idx];
            let removed = remove_at(&mut children[idx], child_rect, key, position, config);
            if removed {
                *slots -= 1;
                // A sparse quad whose children are all leaves folds back
                // into one bucket.
                if *slots <= config.bucket_capacity / 2
                    && children.iter().all(|c| matches!(c, Node::Bucket(_)))
                {
                    let mut merged = Vec::with_capacity(*slots);
                    for child in children.iter_mut() {
                        if let Node::Bucket(bucket) = child {
                            merged.append(bucket);
                        }
                    }
                    *node = Node::Bucket(merged);
                }
            }
            removed
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn collect_near(
    node: &Node,
    rect: Rect,
    zone: &Rect,
    center: Position,
    radius: f64,
    limit: usize,
    geometry: &Geometry,
    out: &mut SearchOutcome,
) {
    if !rect.intersects(zone) {
        return;
    }
    match node {
        Node::Bucket(slots) => {
            for slot in slots {
                if !zone.contains(slot.position) {
                    continue;
                }
                let distance = geometry.distance(center, slot.position);
                if distance <= radius {
                    if out.hits.len() == limit {
                        out.overflow = true;
                        return;
                    }
                    out.hits.push(SearchHit::Entry {
                        key: slot.key.clone(),
                        position: slot.position,
                        distance,
                    });
                }
            }
        }
        Node::Quad { children, .. } => {
            let quads = rect.quadrants();
            for (child, child_rect) in children.iter().zip(quads) {
                collect_near(child, child_rect, zone, center, radius, limit, geometry, out);
                if out.overflow {
                    return;
                }
            }
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn collect_in_rect(
    node: &Node,
    rect: Rect,
    query: &Rect,
    center: Position,
    limit: usize,
    epsilon: Option<f64>,
    geometry: &Geometry,
    out: &mut SearchOutcome,
) {
    if !rect.intersects(query) {
        return;
    }
    match node {
        Node::Bucket(slots) => {
            for slot in slots {
                if !query.contains(slot.position) {
                    continue;
                }
                if out.hits.len() == limit {
                    out.overflow = true;
                    return;
                }
                out.hits.push(SearchHit::Entry {
                    key: slot.key.clone(),
                    position: slot.position,
                    distance: geometry.distance(center, slot.position),
                });
            }
        }
        Node::Quad { children, .. } => {
            let quads = rect.quadrants();
            for (child, child_rect) in children.iter().zip(quads) {
                if let Some(eps) = epsilon {
                    // Dense subtrees inside a small enough cell become a
                    // single summary instead of individual entries.
                    if child.slot_count() > limit / 4
                        && child_rect.lat_span() < eps
                        && child_rect.lon_span() < eps
                        && child_rect.intersects(query)
                    {
                        out.hits.push(SearchHit::Cluster {
                            center: child_rect.center(),
                            radius: geometry
                                .span_distance(child_rect.lat_span(), child_rect.lon_span()),
                            children: child.slot_count(),
                        });
                        continue;
                    }
                }
                collect_in_rect(child, child_rect, query, center, limit, epsilon, geometry, out);
                if out.overflow {
                    return;
                }
            }
        }
    }
}

/// Split a candidate rect into world-bounded zones. Wrapping geometries
/// carry overhang across the antimeridian (either axis); flat geometry
/// clamps instead.
fn wrap_zones(rect: Rect, wraps: bool) -> Vec<Rect> {
    if !wraps {
        let clamped = Rect::new(
            rect.lat0.max(WORLD_BOUNDS.lat0),
            rect.lon0.max(WORLD_BOUNDS.lon0),
            rect.lat1.min(WORLD_BOUNDS.lat1),
            rect.lon1.min(WORLD_BOUNDS.lon1),
        );
        return vec![clamped];
    }
    let mut zones = Vec::with_capacity(4);
    for (lat0, lat1) in axis_segments(rect.lat0, rect.lat1) {
        for (lon0, lon1) in axis_segments(rect.lon0, rect.lon1) {
            zones.push(Rect::new(lat0, lon0, lat1, lon1));
        }
    }
    zones
}

fn axis_segments(lo: f64, hi: f64) -> Vec<(f64, f64)> {
    if hi - lo >= 360.0 {
        return vec![(-180.0, 180.0)];
    }
    if lo < -180.0 {
        vec![(-180.0, hi), (lo + 360.0, 180.0)]
    } else if hi > 180.0 {
        vec![(lo, 180.0), (-180.0, hi - 360.0)]
    } else {
        vec![(lo, hi)]
    }
}

/// Entries nearest first with the key as tiebreak, clusters after entries,
/// densest first.
fn sort_hits(hits: &mut [SearchHit]) {
    hits.sort_by(|a, b| match (a, b) {
        (
            SearchHit::Entry {
                distance: da,
                key: ka,
                ..
            },
            SearchHit::Entry {
                distance: db,
                key: kb,
                ..
            },
        ) => da.total_cmp(db).then_with(|| ka.cmp(kb)),
        (SearchHit::Entry { .. }, SearchHit::Cluster { .. }) => Ordering::Less,
        (SearchHit::Cluster { .. }, SearchHit::Entry { .. }) => Ordering::Greater,
        (
            SearchHit::Cluster {
                children: ca,
                center: pa,
                ..
            },
            SearchHit::Cluster {
                children: cb,
                center: pb,
                ..
            },
        ) => cb
            .cmp(ca)
            .then(pa.latitude.total_cmp(&pb.latitude))
            .then(pa.longitude.total_cmp(&pb.longitude)),
    });
}
