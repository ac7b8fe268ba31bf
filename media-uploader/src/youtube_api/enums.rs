//! YouTube's fixed vocabularies for video categories, privacy and licensing.
//!
//! These values are owned by YouTube; the lists mirror what the Data API accepts for
//! `snippet.categoryId`, `status.privacyStatus` and `status.license`.

use crate::error::ValidationError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

macro_rules! categories {
    ($($variant:ident = $id:literal, $name:literal;)+) => {
        /// A YouTube video category, as assignable to uploads.
        ///
        /// See: <https://developers.google.com/youtube/v3/docs/videoCategories/list>
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum Category {
            $($variant,)+
        }

        impl Category {
            pub const ALL: &'static [Category] = &[$(Category::$variant,)+];

            /// The numeric id YouTube uses for `snippet.categoryId`.
            pub fn id(self) -> &'static str {
                match self {
                    $(Category::$variant => $id,)+
                }
            }

            /// The upper-case name, e.g. `ENTERTAINMENT`.
            pub fn name(self) -> &'static str {
                match self {
                    $(Category::$variant => $name,)+
                }
            }

            pub fn from_id(id: &str) -> Option<Self> {
                match id {
                    $($id => Some(Category::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

categories! {
    FilmAnimation = "1", "FILM_ANIMATION";
    AutosVehicles = "2", "AUTOS_VEHICLES";
    Music = "10", "MUSIC";
    PetsAnimals = "15", "PETS_ANIMALS";
    Sports = "17", "SPORTS";
    ShortMovies = "18", "SHORT_MOVIES";
    TravelEvents = "19", "TRAVEL_EVENTS";
    Gaming = "20", "GAMING";
    Videoblogging = "21", "VIDEOBLOGGING";
    PeopleBlogs = "22", "PEOPLE_BLOGS";
    Comedy = "23", "COMEDY";
    Entertainment = "24", "ENTERTAINMENT";
    NewsPolitics = "25", "NEWS_POLITICS";
    HowtoStyle = "26", "HOWTO_STYLE";
    Education = "27", "EDUCATION";
    ScienceTechnology = "28", "SCIENCE_TECHNOLOGY";
    NonprofitsActivism = "29", "NONPROFITS_ACTIVISM";
}

impl FromStr for Category {
    type Err = ValidationError;

    /// Accepts either the numeric id (`"24"`) or the name in any case, with `-` or spaces in
    /// place of `_` (`"entertainment"`, `"people-blogs"`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some(category) = Category::from_id(s) {
            return Ok(category);
        }
        let normalized = s.to_ascii_uppercase().replace(['-', ' '], "_");
        Category::ALL
            .iter()
            .copied()
            .find(|c| c.name() == normalized)
            .ok_or_else(|| ValidationError::UnknownCategory(s.to_string()))
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for Category {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.id())
    }
}

impl<'de> Deserialize<'de> for Category {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Who can see a video.
///
/// See: <https://developers.google.com/youtube/v3/docs/videos#status.privacyStatus>
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrivacyStatus {
    Public,
    Private,
    Unlisted,
}

impl PrivacyStatus {
    pub const ALL: &'static [PrivacyStatus] = &[
        PrivacyStatus::Public,
        PrivacyStatus::Private,
        PrivacyStatus::Unlisted,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PrivacyStatus::Public => "public",
            PrivacyStatus::Private => "private",
            PrivacyStatus::Unlisted => "unlisted",
        }
    }
}

impl FromStr for PrivacyStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        PrivacyStatus::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == normalized)
            .ok_or_else(|| ValidationError::UnknownPrivacyStatus(s.to_string()))
    }
}

impl fmt::Display for PrivacyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The license a video is published under.
///
/// See: <https://developers.google.com/youtube/v3/docs/videos#status.license>
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum License {
    /// The standard YouTube license.
    #[default]
    Youtube,
    /// Creative Commons Attribution (CC BY).
    CreativeCommon,
}

impl License {
    pub const ALL: &'static [License] = &[License::Youtube, License::CreativeCommon];

    pub fn as_str(self) -> &'static str {
        match self {
            License::Youtube => "youtube",
            License::CreativeCommon => "creativeCommon",
        }
    }
}

impl FromStr for License {
    type Err = ValidationError;

    /// Accepts `youtube` and `creativeCommon` in any case and with or without `_`/`-`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| !matches!(c, '_' | '-'))
            .collect::<String>()
            .to_ascii_lowercase();
        License::ALL
            .iter()
            .copied()
            .find(|l| l.as_str().to_ascii_lowercase() == normalized)
            .ok_or_else(|| ValidationError::UnknownLicense(s.to_string()))
    }
}

impl fmt::Display for License {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
