//! Known dump types and how each one is converted.

use crate::hook::HookKind;
use crate::schema::ColumnSpec;
use anyhow::Result;
use once_cell::sync::Lazy;
use regex::Regex;

/// Conversion settings for one dump type.
#[derive(Debug)]
pub struct DumpConfig {
    /// File stem of the dump, e.g. `Posts` for `Posts.xml.gz`
    pub name: &'static str,
    pub columns: &'static [&'static str],
    pub hook: HookKind,
}

impl DumpConfig {
    pub fn column_specs(&self) -> Result<Vec<ColumnSpec>> {
        self.columns.iter().map(|c| ColumnSpec::parse(c)).collect()
    }
}

pub static DUMP_TABLE: &[DumpConfig] = &[
    DumpConfig {
        name: "Posts",
        columns: &[
            "Id#id:ID(Post)",
            "Title#title",
            "PostTypeId#postType:INT",
            "CreationDate#createdAt:datetime",
            "Score#score:INT",
            "ViewCount#views:INT",
            "AnswerCount#answers:INT",
            "CommentCount#comments:INT",
            "FavoriteCount#favorites:INT",
            "LastEditDate#updatedAt:datetime",
        ],
        hook: HookKind::PostRelationships,
    },
    DumpConfig {
        name: "Tags",
        columns: &[
            "TagName#name:ID(Tag)",
            "Count#count:INT",
            "WikiPostId#wikiPostId:INT",
        ],
        hook: HookKind::None,
    },
    DumpConfig {
        name: "Users",
        columns: &[
            "Id#id:ID(User)",
            "DisplayName#name",
            "Reputation#reputation:INT",
            "CreationDate#createdAt:datetime",
            "LastAccessDate#accessedAt:datetime",
            "WebsiteUrl#url",
            "Location#location",
            "Views#views:INT",
            "UpVotes#upvotes:INT",
            "DownVotes#downvotes:INT",
            "Age#age:INT",
            "AccountId#accountId:INT",
        ],
        hook: HookKind::None,
    },
];

static PATTERNS: Lazy<Vec<(Regex, &'static DumpConfig)>> = Lazy::new(|| {
    DUMP_TABLE
        .iter()
        .map(|config| {
            let pattern = format!(r"^{}(?i:\.xml(?:\.gz|\.bz2)?)$", regex::escape(config.name));
            // names are static identifiers, so the pattern always compiles
            (Regex::new(&pattern).unwrap(), config)
        })
        .collect()
});

/// Dump type for a file name such as `Posts.xml` or `Users.XML.gz`. The dump
/// name itself is matched case-sensitively.
pub fn lookup(file_name: &str) -> Option<&'static DumpConfig> {
    PATTERNS
        .iter()
        .find(|(re, _)| re.is_match(file_name))
        .map(|(_, config)| *config)
}

pub fn by_name(name: &str) -> Option<&'static DumpConfig> {
    DUMP_TABLE.iter().find(|c| c.name == name)
}
