//! Bootstrap seed content submitted when the store holds no spaces.
//!
//! This is a versioned fixture, not configuration. The specs are
//! pre-validated, so bootstrap submits them without going through the
//! authoring validator.

use crate::state::{Coord, META_MULTI, Meta, Space, Surface, Where, WhereEntry};

/// Bumped whenever the seed table changes shape or content.
pub const SEED_VERSION: u32 = 1;

/// A where placed by whoever runs the bootstrap.
pub struct SeedLocalWhere {
    pub location: (f64, f64),
    pub tag: &'static str,
}

/// A where owned by a fixed, fictional participant.
pub struct SeedDecoyWhere {
    pub author_pub_key: &'static str,
    pub name: &'static str,
    pub img: &'static str,
    pub location: (f64, f64),
    pub tag: &'static str,
}

pub struct SeedSpace {
    pub name: &'static str,
    pub url: &'static str,
    pub size: (f64, f64),
    pub data: &'static str,
    pub multi: bool,
    pub local_wheres: &'static [SeedLocalWhere],
    pub decoy_wheres: &'static [SeedDecoyWhere],
}

pub const DECOY_PUB_KEY: &str = "sntahoeuabcorchaotbkantgcdoesucd";

pub const SEED_SPACES: &[SeedSpace] = &[
    SeedSpace {
        name: "earth",
        url: "https://h5pstudio.ecampusontario.ca/sites/default/files/h5p/content/9451/images/image-5f6645b4ef14e.jpg",
        size: (3840.0, 1799.0),
        data: r#"[{"box":{"left":100,"top":10,"width":100,"height":50},"style":"padding:10px;background-color:white;border-radius: 10px;","content":"Land of the Lost"}]"#,
        multi: false,
        local_wheres: &[SeedLocalWhere { location: (1150.0, 450.0), tag: "My house" }],
        decoy_wheres: &[SeedDecoyWhere {
            author_pub_key: DECOY_PUB_KEY,
            name: "Monk",
            img: "https://i.imgur.com/4BKqQY1.png",
            location: (1890.0, 500.0),
            tag: "My apartment",
        }],
    },
    SeedSpace {
        name: "Ecuador",
        url: "https://www.freeworldmaps.net/southamerica/ecuador/ecuador-map.jpg",
        size: (800.0, 652.0),
        data: "[]",
        multi: true,
        local_wheres: &[],
        decoy_wheres: &[],
    },
    SeedSpace {
        name: "Abstract",
        url: "",
        size: (1000.0, 700.0),
        data: r#"[{"box":{"left":0,"top":0,"width":1000,"height":700},"style":"background-image: linear-gradient(to bottom right, red, yellow);","content":""},{"box":{"left":450,"top":300,"width":100,"height":100},"style":"background-color:blue;border-radius: 10000px;","content":""}]"#,
        multi: true,
        local_wheres: &[],
        decoy_wheres: &[],
    },
];

/// The local participant as stamped onto seed wheres.
pub struct SeedAuthor<'a> {
    pub public_key: &'a str,
    pub nickname: &'a str,
    pub avatar_url: &'a str,
}

impl SeedSpace {
    /// Materialize this seed as a creation request authored by `me`.
    #[must_use]
    pub fn to_space(&self, me: &SeedAuthor<'_>) -> Space {
        let mut meta = Meta::new();
        if self.multi {
            meta.insert(META_MULTI.into(), "true".into());
        }

        let local = self.local_wheres.iter().map(|w| {
            where_entry(me.public_key, w.location, &[("img", me.avatar_url), ("name", me.nickname), ("tag", w.tag)])
        });
        let decoys = self.decoy_wheres.iter().map(|w| {
            where_entry(w.author_pub_key, w.location, &[("img", w.img), ("name", w.name), ("tag", w.tag)])
        });

        Space {
            name: self.name.into(),
            surface: Surface { url: self.url.into(), size: Coord::new(self.size.0, self.size.1), data: self.data.into() },
            meta,
            wheres: local.chain(decoys).collect(),
        }
    }
}

fn where_entry(author: &str, (x, y): (f64, f64), meta: &[(&str, &str)]) -> WhereEntry {
    WhereEntry {
        entry: Where {
            location: Coord::new(x, y),
            meta: meta
                .iter()
                .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
                .collect(),
        },
        hash: String::new(),
        author_pub_key: author.to_owned(),
    }
}

/// All seed spaces, in submission order.
#[must_use]
pub fn seed_spaces(me: &SeedAuthor<'_>) -> Vec<Space> {
    SEED_SPACES.iter().map(|s| s.to_space(me)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ME: SeedAuthor<'static> =
        SeedAuthor { public_key: "agent-me", nickname: "Zippy", avatar_url: "https://img.test/me.jpg" };

    #[test]
    fn seeds_are_earth_ecuador_abstract_in_order() {
        let names: Vec<_> = seed_spaces(&ME).into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["earth", "Ecuador", "Abstract"]);
    }

    #[test]
    fn earth_carries_local_and_decoy_wheres() {
        let earth = SEED_SPACES[0].to_space(&ME);
        assert_eq!(earth.wheres.len(), 2);

        let mine = &earth.wheres[0];
        assert_eq!(mine.author_pub_key, "agent-me");
        assert_eq!(mine.entry.meta["name"], "Zippy");
        assert_eq!(mine.entry.meta["img"], "https://img.test/me.jpg");
        assert_eq!(mine.entry.meta["tag"], "My house");
        assert_eq!(mine.entry.location, Coord::new(1150.0, 450.0));

        let decoy = &earth.wheres[1];
        assert_eq!(decoy.author_pub_key, DECOY_PUB_KEY);
        assert_eq!(decoy.entry.meta["name"], "Monk");
        assert!(earth.wheres.iter().all(|w| w.hash.is_empty()));
    }

    #[test]
    fn every_seed_has_positive_size_and_valid_name() {
        for space in seed_spaces(&ME) {
            assert!(space.surface.size.is_positive_area(), "{}", space.name);
            assert!(crate::authoring::validate_name(&space.name).is_ok(), "{}", space.name);
            assert!(serde_json::from_str::<serde_json::Value>(&space.surface.data).is_ok(), "{}", space.name);
        }
    }

    #[test]
    fn multi_flag_follows_table() {
        let spaces = seed_spaces(&ME);
        assert!(!spaces[0].allows_multiple_wheres());
        assert!(spaces[1].allows_multiple_wheres());
        assert!(spaces[2].allows_multiple_wheres());
        assert!(spaces[2].surface.url.is_empty(), "abstract space has no image");
    }
}
