//! Splitting sources into smaller ones, to balance the work between tasks.
use crate::source::{Source, SourceID};

/// Split a source into its children.
///
/// Sources which cannot be split are returned unchanged. If the source has a minimum magnitude,
/// children whose ruptures all fall below it are discarded; if no rupture reaches it at all, the
/// source is returned unchanged. Fragments get IDs of the form `parent:index` when there is more
/// than one of them and otherwise keep the parent ID.
pub fn split_source(src: &Source) -> Vec<Source> {
    if !src.is_splittable() {
        return vec![src.clone()];
    }

    let mut children = src.children();
    if src.min_mag > 0.0 {
        let (_, max_mag) = src.min_max_mag();
        if max_mag < src.min_mag {
            return vec![src.clone()];
        }
        children.retain(|kind| kind.min_max_mag().1 >= src.min_mag);
    }

    let has_many = children.len() > 1;
    children
        .into_iter()
        .enumerate()
        .map(|(i, kind)| {
            let id = if has_many {
                SourceID::from(format!("{}:{i}", src.id))
            } else {
                src.id.clone()
            };
            src.fragment(id, kind)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixture::{area_source, multi_fault_source, non_parametric_source, point_source};
    use crate::source::SourceKind;
    use itertools::Itertools;
    use rstest::rstest;

    #[rstest]
    fn test_unsplittable(point_source: Source, multi_fault_source: Source) {
        for src in [point_source, multi_fault_source] {
            assert_eq!(split_source(&src), [src.clone()]);
        }
    }

    #[rstest]
    fn test_split_area(mut area_source: Source) {
        area_source.ordinal = 3;
        area_source.grp_id = 1;
        let splits = split_source(&area_source);
        assert!(splits.len() > 1);

        for (i, split) in splits.iter().enumerate() {
            assert_eq!(split.id, SourceID::from(format!("area:{i}")));
            assert_eq!(split.ordinal, 3);
            assert_eq!(split.grp_id, 1);
            assert_eq!(split.trt, area_source.trt);
            assert!(matches!(split.kind, SourceKind::Point(_)));
        }

        // Rupture counts are preserved
        let total: usize = splits.iter().map(|split| split.iter_ruptures().count()).sum();
        assert_eq!(total as u32, area_source.count_ruptures());
        assert_eq!(
            splits.iter().map(|split| split.num_ruptures).sum::<u32>(),
            area_source.num_ruptures
        );
    }

    #[rstest]
    fn test_split_non_parametric(non_parametric_source: Source) {
        // The fixture has fewer ruptures than a block, so the ID is kept
        let splits = split_source(&non_parametric_source);
        assert_eq!(splits.len(), 1);
        assert_eq!(splits[0].id, non_parametric_source.id);
        assert_eq!(
            splits[0].iter_ruptures().count() as u32,
            non_parametric_source.count_ruptures()
        );
    }

    #[rstest]
    fn test_split_min_mag(mut non_parametric_source: Source) {
        let SourceKind::NonParametric(src) = &mut non_parametric_source.kind else {
            unreachable!()
        };
        // Three blocks: two of magnitude 5 and one of magnitude 7
        let template = src.ruptures[0].clone();
        src.ruptures = (0..300)
            .map(|i| {
                let mut rup = template.clone();
                rup.mag = if i < 200 { 5.0 } else { 7.0 };
                rup
            })
            .collect();
        non_parametric_source.min_mag = 6.0;

        let splits = split_source(&non_parametric_source);
        assert_eq!(splits.len(), 1);
        assert_eq!(splits[0].id, non_parametric_source.id);
        assert_eq!(splits[0].num_ruptures, 100);

        // Nothing reaches the cutoff: the source is returned as is
        non_parametric_source.min_mag = 8.0;
        assert_eq!(
            split_source(&non_parametric_source),
            [non_parametric_source.clone()]
        );
        assert_eq!(non_parametric_source.count_ruptures(), 0);
    }

    #[rstest]
    fn test_split_ids_unique(area_source: Source) {
        let splits = split_source(&area_source);
        assert!(splits.iter().map(|split| &split.id).all_unique());
    }
}
