//! PT-003: Entity rule table - allowed children per template.

use super::types::{EntityType, ProductionType};
use std::fmt;

/// Hierarchy template, selected by a project's production type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Template {
    FeatureFilm,
    TvShow,
    ShotsOnly,
    AssetOnly,
    Custom,
}

impl Template {
    pub fn for_production(pt: ProductionType) -> Self {
        match pt {
            ProductionType::Film => Self::FeatureFilm,
            ProductionType::Tv => Self::TvShow,
            ProductionType::ShotsOnly => Self::ShotsOnly,
            ProductionType::AssetsOnly => Self::AssetOnly,
            ProductionType::Custom => Self::Custom,
        }
    }
}

impl fmt::Display for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FeatureFilm => write!(f, "Feature Film"),
            Self::TvShow => write!(f, "TV Show"),
            Self::ShotsOnly => write!(f, "Shots Only"),
            Self::AssetOnly => write!(f, "Asset Only"),
            Self::Custom => write!(f, "Custom"),
        }
    }
}

/// What a type may contain under a template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityRule {
    pub children: &'static [EntityType],
    pub deletable: bool,
}

use EntityType::{Asset, AssetType, Episode, Project, Sequence, Shot};

const fn rule(children: &'static [EntityType]) -> EntityRule {
    EntityRule {
        children,
        deletable: true,
    }
}

const fn root(children: &'static [EntityType]) -> EntityRule {
    EntityRule {
        children,
        deletable: false,
    }
}

/// Look up the rule for `kind` under `template`. `None` means the type does
/// not appear in that template at all.
pub fn lookup(template: Template, kind: EntityType) -> Option<EntityRule> {
    match (template, kind) {
        (Template::FeatureFilm, Project) => Some(root(&[Sequence, AssetType])),
        (Template::TvShow, Project) => Some(root(&[Episode, AssetType])),
        (Template::ShotsOnly, Project) => Some(root(&[Sequence])),
        (Template::AssetOnly, Project) => Some(root(&[AssetType])),
        (Template::Custom, Project) => Some(root(&[Episode, Sequence, AssetType])),

        (Template::TvShow | Template::Custom, Episode) => Some(rule(&[Sequence])),

        (Template::FeatureFilm | Template::TvShow | Template::ShotsOnly | Template::Custom, Sequence) => {
            Some(rule(&[Shot]))
        }
        (Template::FeatureFilm | Template::TvShow | Template::ShotsOnly | Template::Custom, Shot) => {
            Some(rule(&[]))
        }

        (Template::FeatureFilm | Template::TvShow | Template::AssetOnly | Template::Custom, AssetType) => {
            Some(rule(&[Asset]))
        }
        (Template::FeatureFilm | Template::TvShow | Template::AssetOnly | Template::Custom, Asset) => {
            Some(rule(&[]))
        }

        _ => None,
    }
}

/// Whether `child` may sit directly under `parent` in `template`.
pub fn allows_child(template: Template, parent: EntityType, child: EntityType) -> bool {
    lookup(template, parent).is_some_and(|r| r.children.contains(&child))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEMPLATES: [Template; 5] = [
        Template::FeatureFilm,
        Template::TvShow,
        Template::ShotsOnly,
        Template::AssetOnly,
        Template::Custom,
    ];

    #[test]
    fn test_pt003_feature_film() {
        let t = Template::FeatureFilm;
        assert!(allows_child(t, Project, Sequence));
        assert!(allows_child(t, Project, AssetType));
        assert!(!allows_child(t, Project, Episode));
        assert!(allows_child(t, Sequence, Shot));
        assert!(allows_child(t, AssetType, Asset));
        assert!(lookup(t, Episode).is_none());
    }

    #[test]
    fn test_pt003_tv_show() {
        let t = Template::TvShow;
        assert!(allows_child(t, Project, Episode));
        assert!(!allows_child(t, Project, Sequence));
        assert!(allows_child(t, Episode, Sequence));
    }

    #[test]
    fn test_pt003_restricted_templates() {
        assert!(!allows_child(Template::ShotsOnly, Project, AssetType));
        assert!(lookup(Template::ShotsOnly, Asset).is_none());
        assert!(!allows_child(Template::AssetOnly, Project, Sequence));
        assert!(lookup(Template::AssetOnly, Shot).is_none());
    }

    #[test]
    fn test_pt003_custom_allows_everything_under_project() {
        for kind in [Episode, Sequence, AssetType] {
            assert!(allows_child(Template::Custom, Project, kind));
        }
        assert!(!allows_child(Template::Custom, Project, Shot));
    }

    #[test]
    fn test_pt003_only_project_undeletable() {
        for t in TEMPLATES {
            for kind in EntityType::ALL {
                if let Some(r) = lookup(t, kind) {
                    assert_eq!(r.deletable, kind != Project, "{} {}", t, kind);
                }
            }
        }
    }

    #[test]
    fn test_pt003_leaves_have_no_children() {
        for t in TEMPLATES {
            for kind in [Shot, Asset] {
                if let Some(r) = lookup(t, kind) {
                    assert!(r.children.is_empty());
                }
            }
        }
    }

    #[test]
    fn test_pt003_template_selection() {
        assert_eq!(
            Template::for_production(ProductionType::Tv),
            Template::TvShow
        );
        assert_eq!(Template::FeatureFilm.to_string(), "Feature Film");
        assert_eq!(Template::AssetOnly.to_string(), "Asset Only");
    }
}
