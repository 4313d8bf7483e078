//! Sites are the locations at which ground motion and damage are computed.
//!
//! A [`SiteCollection`] is either complete or a filtered view onto a complete collection. Site IDs
//! are never renumbered: a filtered collection keeps the IDs of the complete collection it was
//! derived from, which remains reachable through [`SiteCollection::complete`].
use crate::geo::{BoundingBox, Point};
use rstar::RTree;
use rstar::primitives::GeomWithData;
use std::sync::Arc;

/// A single site
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Site {
    /// The ID of the site, which is its position in the complete collection
    pub sid: u32,
    /// The location of the site
    pub location: Point,
}

/// An ordered collection of sites, possibly a filtered view of a larger collection
#[derive(Debug, Clone)]
pub struct SiteCollection {
    complete: Arc<[Site]>,
    sids: Option<Arc<[u32]>>,
}

impl PartialEq for SiteCollection {
    fn eq(&self, other: &Self) -> bool {
        self.complete == other.complete && self.sids() == other.sids()
    }
}

impl SiteCollection {
    /// Create a complete collection from a list of locations.
    ///
    /// Site IDs are assigned in order, starting from zero.
    pub fn new<I>(locations: I) -> Self
    where
        I: IntoIterator<Item = Point>,
    {
        let complete: Arc<[Site]> = locations
            .into_iter()
            .enumerate()
            .map(|(sid, location)| Site {
                sid: sid as u32,
                location,
            })
            .collect();

        Self {
            complete,
            sids: None,
        }
    }

    /// The number of sites in the collection
    pub fn len(&self) -> usize {
        self.sids
            .as_ref()
            .map_or(self.complete.len(), |sids| sids.len())
    }

    /// Whether the collection is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether this collection is the complete one
    pub fn is_complete(&self) -> bool {
        self.sids.is_none()
    }

    /// The complete collection this collection was derived from
    pub fn complete(&self) -> SiteCollection {
        Self {
            complete: Arc::clone(&self.complete),
            sids: None,
        }
    }

    /// The IDs of the sites in this collection, in increasing order
    pub fn sids(&self) -> Vec<u32> {
        match &self.sids {
            Some(sids) => sids.to_vec(),
            None => (0..self.complete.len() as u32).collect(),
        }
    }

    /// Iterate over the sites in this collection
    pub fn iter(&self) -> Box<dyn Iterator<Item = &Site> + '_> {
        match &self.sids {
            Some(sids) => Box::new(sids.iter().map(|sid| &self.complete[*sid as usize])),
            None => Box::new(self.complete.iter()),
        }
    }

    /// Get a site by its ID, looking in the complete collection
    pub fn get(&self, sid: u32) -> Option<&Site> {
        self.complete.get(sid as usize)
    }

    /// Create a view of the sites with the given IDs.
    ///
    /// IDs refer to the complete collection. Unknown IDs are ignored and duplicates removed.
    pub fn filtered(&self, sids: &[u32]) -> SiteCollection {
        let n = self.complete.len();
        let mut sids: Vec<u32> = sids
            .iter()
            .copied()
            .filter(|sid| (*sid as usize) < n)
            .collect();
        sids.sort_unstable();
        sids.dedup();

        if sids.len() == n {
            return self.complete();
        }

        Self {
            complete: Arc::clone(&self.complete),
            sids: Some(sids.into()),
        }
    }

    /// The IDs of the sites lying strictly inside the given box
    pub fn within_bbox(&self, bbox: &BoundingBox) -> Vec<u32> {
        self.iter()
            .filter(|site| bbox.contains(site.location.lon, site.location.lat))
            .map(|site| site.sid)
            .collect()
    }

    /// The Cartesian coordinates of the sites in this collection
    pub fn xyz(&self) -> Vec<[f64; 3]> {
        self.iter().map(|site| site.location.xyz()).collect()
    }
}

/// A 3D spatial index over the Cartesian positions of a set of sites
pub struct SiteIndex {
    tree: RTree<GeomWithData<[f64; 3], u32>>,
}

impl SiteIndex {
    /// Build the index for the given sites
    pub fn new(sitecol: &SiteCollection) -> Self {
        let entries = sitecol
            .iter()
            .map(|site| GeomWithData::new(site.location.xyz(), site.sid))
            .collect();

        Self {
            tree: RTree::bulk_load(entries),
        }
    }

    /// The sorted IDs of the sites lying within `radius` km of the given Cartesian position
    pub fn within(&self, xyz: [f64; 3], radius: f64) -> Vec<u32> {
        let mut sids: Vec<u32> = self
            .tree
            .locate_within_distance(xyz, radius * radius)
            .map(|entry| entry.data)
            .collect();
        sids.sort_unstable();
        sids
    }

    /// The number of indexed sites
    pub fn len(&self) -> usize {
        self.tree.size()
    }

    /// Whether the index is empty
    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }
}
