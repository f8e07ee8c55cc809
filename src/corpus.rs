//! Corpus builder.
//!
//! Flattens the three JSON artist collections (biographies, albums, songs)
//! into the plain-text corpora consumed by the indexer. The collections
//! share the artist `Name` as join key; the biography collection drives
//! the output order and an artist may be missing from the other two.
//!
//! Each consolidated record uses a fixed three-paragraph template:
//!
//! ```text
//! Biografia: <biography>
//!
//! Álbuns: <title> (<year>)
//! <title> (<year>)
//!
//! Músicas: <song>, <song>, <song>
//! ```
//!
//! After joining, every run of three or more newlines is collapsed to a
//! single blank line.

use anyhow::{Context, Result};
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::models::ConsolidatedDocument;

pub const NO_ALBUMS: &str = "Nenhum álbum disponível";
pub const NO_SONGS: &str = "Nenhuma música disponível";

pub const BIOGRAPHIES_FILE: &str = "biographies.txt";
pub const ALBUMS_FILE: &str = "albums.txt";
pub const SONGS_FILE: &str = "songs.txt";

#[derive(Debug, Clone, Deserialize)]
pub struct BiographyRecord {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Biography")]
    pub biography: Biography,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Biography {
    #[serde(rename = "Content", default, deserialize_with = "null_as_empty")]
    pub content: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlbumsRecord {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Albums", default)]
    pub albums: Vec<Album>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Album {
    pub title: String,
    #[serde(default)]
    pub year: AlbumYear,
}

impl Album {
    /// `<title> (<year>)`, or just the title when the year is unknown.
    fn line(&self) -> String {
        match self.year {
            AlbumYear::Missing => self.title.clone(),
            _ => format!("{} ({})", self.title, self.year),
        }
    }
}

/// Release year as found in the source data: usually an integer, sometimes
/// a float, text, or null.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum AlbumYear {
    Number(i64),
    Float(f64),
    Text(String),
    #[default]
    Missing,
}

impl fmt::Display for AlbumYear {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlbumYear::Number(n) => write!(f, "{}", n),
            AlbumYear::Float(x) if x.fract() == 0.0 => write!(f, "{:.1}", x),
            AlbumYear::Float(x) => write!(f, "{}", x),
            AlbumYear::Text(s) => f.write_str(s),
            AlbumYear::Missing => Ok(()),
        }
    }
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Deserialize)]
pub struct SongsRecord {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Songs", default)]
    pub songs: Vec<String>,
}

/// The three input collections, parsed.
#[derive(Debug, Clone, Default)]
pub struct ArtistCollections {
    pub biographies: Vec<BiographyRecord>,
    pub albums: Vec<AlbumsRecord>,
    pub songs: Vec<SongsRecord>,
}

impl ArtistCollections {
    /// Read and parse the three JSON collection files.
    pub fn load(biographies: &Path, albums: &Path, songs: &Path) -> Result<Self> {
        Ok(Self {
            biographies: parse_collection(&read(biographies)?, "biographies")?,
            albums: parse_collection(&read(albums)?, "albums")?,
            songs: parse_collection(&read(songs)?, "songs")?,
        })
    }
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read collection: {}", path.display()))
}

/// Parse a JSON array of records, failing on the first malformed one.
///
/// Errors name the collection and the record position, e.g.
/// `biographies[3]: missing field `Name``.
pub fn parse_collection<T: DeserializeOwned>(json: &str, collection: &str) -> Result<Vec<T>> {
    let values: Vec<serde_json::Value> = serde_json::from_str(json)
        .with_context(|| format!("{}: expected a JSON array of records", collection))?;

    values
        .into_iter()
        .enumerate()
        .map(|(i, v)| {
            serde_json::from_value(v).with_context(|| format!("{}[{}]: invalid record", collection, i))
        })
        .collect()
}

/// Join the collections by artist name into one document per biography.
///
/// The first albums/songs record carrying a given name wins.
pub fn consolidate_artist_data(collections: &ArtistCollections) -> Vec<ConsolidatedDocument> {
    let albums = first_by_name(&collections.albums, |r| &r.name);
    let songs = first_by_name(&collections.songs, |r| &r.name);

    collections
        .biographies
        .iter()
        .map(|bio| {
            let albums_text = albums_text(albums.get(bio.name.as_str()).map(|r| r.albums.as_slice()));
            let songs_text = songs_text(songs.get(bio.name.as_str()).map(|r| r.songs.as_slice()));
            ConsolidatedDocument {
                artist: bio.name.clone(),
                content: format!(
                    "Biografia: {}\n\nÁlbuns: {}\n\nMúsicas: {}",
                    bio.biography.content, albums_text, songs_text
                ),
            }
        })
        .collect()
}

fn first_by_name<'a, T>(records: &'a [T], name: impl Fn(&T) -> &String) -> HashMap<&'a str, &'a T> {
    let mut map = HashMap::with_capacity(records.len());
    for r in records {
        map.entry(name(r).as_str()).or_insert(r);
    }
    map
}

fn albums_text(albums: Option<&[Album]>) -> String {
    match albums {
        Some(albums) if !albums.is_empty() => albums
            .iter()
            .map(Album::line)
            .collect::<Vec<_>>()
            .join("\n"),
        _ => NO_ALBUMS.to_string(),
    }
}

fn songs_text(songs: Option<&[String]>) -> String {
    match songs {
        Some(songs) if !songs.is_empty() => songs.join(", "),
        _ => NO_SONGS.to_string(),
    }
}

/// Collapse every run of three or more `\n` into exactly two.
pub fn normalize_blank_lines(text: &str) -> String {
    static RUNS: OnceLock<Regex> = OnceLock::new();
    let re = RUNS.get_or_init(|| Regex::new(r"\n{3,}").expect("static regex"));
    re.replace_all(text, "\n\n").into_owned()
}

/// Join documents with a blank line and normalize the result.
pub fn join_documents<'a>(contents: impl IntoIterator<Item = &'a str>) -> String {
    let joined = contents.into_iter().collect::<Vec<_>>().join("\n\n");
    normalize_blank_lines(&joined)
}

/// The three plain-text corpora rendered from one set of collections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Corpora {
    pub biographies: String,
    pub albums: String,
    pub songs: String,
}

/// Render all three corpora.
///
/// `biographies` is the full consolidated text. `albums` and `songs` carry
/// one `Artista:` header per artist followed by the matching section of
/// the consolidated template, so the narrower indexes stay attributable.
pub fn build_corpora(collections: &ArtistCollections) -> Corpora {
    let documents = consolidate_artist_data(collections);
    let albums = first_by_name(&collections.albums, |r| &r.name);
    let songs = first_by_name(&collections.songs, |r| &r.name);

    let album_sections: Vec<String> = collections
        .biographies
        .iter()
        .map(|bio| {
            format!(
                "Artista: {}\nÁlbuns: {}",
                bio.name,
                albums_text(albums.get(bio.name.as_str()).map(|r| r.albums.as_slice()))
            )
        })
        .collect();
    let song_sections: Vec<String> = collections
        .biographies
        .iter()
        .map(|bio| {
            format!(
                "Artista: {}\nMúsicas: {}",
                bio.name,
                songs_text(songs.get(bio.name.as_str()).map(|r| r.songs.as_slice()))
            )
        })
        .collect();

    Corpora {
        biographies: join_documents(documents.iter().map(|d| d.content.as_str())),
        albums: join_documents(album_sections.iter().map(String::as_str)),
        songs: join_documents(song_sections.iter().map(String::as_str)),
    }
}

/// Write the corpora to `out_dir`, returning the paths written.
pub fn write_corpora(corpora: &Corpora, out_dir: &Path) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create output directory: {}", out_dir.display()))?;

    let files = [
        (BIOGRAPHIES_FILE, &corpora.biographies),
        (ALBUMS_FILE, &corpora.albums),
        (SONGS_FILE, &corpora.songs),
    ];

    let mut written = Vec::with_capacity(files.len());
    for (name, content) in files {
        let path = out_dir.join(name);
        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write corpus: {}", path.display()))?;
        written.push(path);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collections() -> ArtistCollections {
        ArtistCollections {
            biographies: parse_collection(
                r#"[
                    {"Name": "Taylor Swift", "Biography": {"Content": "Cantora americana."}},
                    {"Name": "Anitta", "Biography": {"Content": "Cantora brasileira."}},
                    {"Name": "Sem Bio", "Biography": {}}
                ]"#,
                "biographies",
            )
            .unwrap(),
            albums: parse_collection(
                r#"[
                    {"Name": "Taylor Swift", "Albums": [
                        {"title": "Fearless", "year": 2008},
                        {"title": "1989", "year": "2014"}
                    ]},
                    {"Name": "Taylor Swift", "Albums": [{"title": "Duplicado", "year": 1999}]}
                ]"#,
                "albums",
            )
            .unwrap(),
            songs: parse_collection(
                r#"[{"Name": "Taylor Swift", "Songs": ["Love Story", "Shake It Off"]}]"#,
                "songs",
            )
            .unwrap(),
        }
    }

    #[test]
    fn test_consolidated_template() {
        let docs = consolidate_artist_data(&collections());
        assert_eq!(docs.len(), 3);
        assert_eq!(docs[0].artist, "Taylor Swift");
        assert_eq!(
            docs[0].content,
            "Biografia: Cantora americana.\n\nÁlbuns: Fearless (2008)\n1989 (2014)\n\nMúsicas: Love Story, Shake It Off"
        );
    }

    #[test]
    fn test_missing_albums_and_songs_use_sentinels() {
        let docs = consolidate_artist_data(&collections());
        assert_eq!(
            docs[1].content,
            format!("Biografia: Cantora brasileira.\n\nÁlbuns: {}\n\nMúsicas: {}", NO_ALBUMS, NO_SONGS)
        );
    }

    #[test]
    fn test_empty_album_list_uses_sentinel() {
        let mut c = collections();
        c.albums = parse_collection(r#"[{"Name": "Anitta", "Albums": []}]"#, "albums").unwrap();
        let docs = consolidate_artist_data(&c);
        assert!(docs[1].content.contains(&format!("Álbuns: {}", NO_ALBUMS)));
    }

    #[test]
    fn test_missing_content_defaults_to_empty() {
        let docs = consolidate_artist_data(&collections());
        assert!(docs[2].content.starts_with("Biografia: \n\nÁlbuns:"));
    }

    #[test]
    fn test_null_content_and_odd_years_are_tolerated() {
        let mut c = collections();
        c.biographies = parse_collection(
            r#"[{"Name": "Taylor Swift", "Biography": {"Content": null}}]"#,
            "biographies",
        )
        .unwrap();
        c.albums = parse_collection(
            r#"[{"Name": "Taylor Swift", "Albums": [
                {"title": "Fearless", "year": 2008.0},
                {"title": "Meio", "year": 2010.5},
                {"title": "Sem Ano", "year": null},
                {"title": "Ausente"}
            ]}]"#,
            "albums",
        )
        .unwrap();

        let docs = consolidate_artist_data(&c);
        assert!(docs[0].content.starts_with("Biografia: \n\nÁlbuns: "), "{}", docs[0].content);
        assert!(docs[0]
            .content
            .contains("Fearless (2008.0)\nMeio (2010.5)\nSem Ano\nAusente\n\n"));
    }

    #[test]
    fn test_first_matching_record_wins() {
        let docs = consolidate_artist_data(&collections());
        assert!(!docs[0].content.contains("Duplicado"));
    }

    #[test]
    fn test_missing_name_fails_fast() {
        let err = parse_collection::<BiographyRecord>(
            r#"[{"Name": "A", "Biography": {}}, {"Biography": {"Content": "x"}}]"#,
            "biographies",
        )
        .unwrap_err();
        let msg = format!("{:#}", err);
        assert!(msg.contains("biographies[1]"), "{}", msg);
        assert!(msg.contains("Name"), "{}", msg);
    }

    #[test]
    fn test_not_an_array_is_an_error() {
        assert!(parse_collection::<SongsRecord>(r#"{"Name": "A"}"#, "songs").is_err());
    }

    #[test]
    fn test_normalize_collapses_runs() {
        assert_eq!(normalize_blank_lines("a\n\n\nb"), "a\n\nb");
        assert_eq!(normalize_blank_lines("a\n\n\n\n\n\nb\n\nc\nd"), "a\n\nb\n\nc\nd");
        assert_eq!(normalize_blank_lines("no breaks"), "no breaks");
    }

    #[test]
    fn test_corpus_never_has_three_newlines() {
        let mut c = collections();
        c.biographies[0].biography.content = "Linha um.\n\n\n\n\nLinha dois.\n\n".to_string();
        let corpora = build_corpora(&c);
        for text in [&corpora.biographies, &corpora.albums, &corpora.songs] {
            assert!(!text.contains("\n\n\n"));
        }
        assert!(corpora.biographies.contains("Linha um.\n\nLinha dois.\n\nÁlbuns:"));
    }

    #[test]
    fn test_build_is_deterministic() {
        assert_eq!(build_corpora(&collections()), build_corpora(&collections()));
    }

    #[test]
    fn test_album_and_song_corpora() {
        let corpora = build_corpora(&collections());
        assert!(corpora
            .albums
            .starts_with("Artista: Taylor Swift\nÁlbuns: Fearless (2008)\n1989 (2014)\n\nArtista: Anitta"));
        assert!(corpora
            .songs
            .contains("Artista: Anitta\nMúsicas: Nenhuma música disponível"));
    }

    #[test]
    fn test_write_corpora() {
        let tmp = tempfile::TempDir::new().unwrap();
        let corpora = build_corpora(&collections());
        let written = write_corpora(&corpora, &tmp.path().join("out")).unwrap();
        assert_eq!(written.len(), 3);
        let bio = std::fs::read_to_string(tmp.path().join("out").join(BIOGRAPHIES_FILE)).unwrap();
        assert_eq!(bio, corpora.biographies);
    }
}
