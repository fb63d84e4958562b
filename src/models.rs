use sea_orm::DbErr;
use serde::{Deserialize, Serialize};

use crate::{
    entities::movie,
    error::{AppError, AppResult},
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movie {
    pub id: i32,
    pub title: String,
    pub year: i32,
    pub runtime: String,
    pub genres: Vec<String>,
    pub director: String,
    pub actors: String,
    pub plot: String,
    pub poster_url: String,
    pub is_wishlisted: bool,
}

impl Movie {
    /// Builds the stored row for this movie at catalog index `position`.
    pub fn to_row(&self, position: i32) -> AppResult<movie::Model> {
        Ok(movie::Model {
            position,
            movie_id: self.id,
            title: self.title.clone(),
            year: self.year.to_string(),
            runtime: self.runtime.clone(),
            genres: serde_json::to_string(&self.genres)?,
            director: self.director.clone(),
            actors: self.actors.clone(),
            plot: self.plot.clone(),
            poster_url: self.poster_url.clone(),
            is_wishlisted: self.is_wishlisted,
        })
    }
}

impl TryFrom<movie::Model> for Movie {
    type Error = AppError;

    fn try_from(row: movie::Model) -> AppResult<Self> {
        let genres = if row.genres.trim().is_empty() {
            Vec::new()
        } else {
            serde_json::from_str(&row.genres).map_err(|e| {
                DbErr::Json(format!("genres of movie {}: {e}", row.movie_id))
            })?
        };

        Ok(Self {
            id: row.movie_id,
            title: row.title,
            // Same rule as the CAST(year AS INTEGER) ordering: unparsable is 0.
            year: row.year.trim().parse().unwrap_or(0),
            runtime: row.runtime,
            genres,
            director: row.director,
            actors: row.actors,
            plot: row.plot,
            poster_url: row.poster_url,
            is_wishlisted: row.is_wishlisted,
        })
    }
}

/// Free-text search plus an optional genre, applied to loaded movies.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct MovieFilter {
    #[serde(default, rename = "q")]
    pub query: Option<String>,
    #[serde(default)]
    pub genre: Option<String>,
}

impl MovieFilter {
    pub fn is_empty(&self) -> bool {
        self.normalized_query().is_none() && self.genre().is_none()
    }

    pub fn matches(&self, movie: &Movie) -> bool {
        let matches_query = match self.normalized_query() {
            None => true,
            Some(q) => [&movie.title, &movie.director, &movie.plot, &movie.actors]
                .iter()
                .any(|field| field.to_lowercase().contains(&q)),
        };

        let matches_genre = match self.genre() {
            None => true,
            Some(genre) => movie.genres.iter().any(|g| g.eq_ignore_ascii_case(genre)),
        };

        matches_query && matches_genre
    }

    fn normalized_query(&self) -> Option<String> {
        self.query.as_deref().map(|q| q.trim().to_lowercase()).filter(|q| !q.is_empty())
    }

    fn genre(&self) -> Option<&str> {
        self.genre.as_deref().map(str::trim).filter(|g| !g.is_empty())
    }
}

#[cfg(test)]
pub(crate) fn sample_movie(id: i32, year: i32) -> Movie {
    Movie {
        id,
        title: format!("Movie {id}"),
        year,
        runtime: "100".to_string(),
        genres: vec!["Drama".to_string()],
        director: "Jane Doe".to_string(),
        actors: "A. Actor, B. Actor".to_string(),
        plot: "Things happen.".to_string(),
        poster_url: format!("https://example.com/{id}.jpg"),
        is_wishlisted: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_conversion_keeps_fields() {
        let mut movie = sample_movie(7, 1994);
        movie.genres = vec!["Crime".into(), "Drama".into()];
        movie.is_wishlisted = true;

        let row = movie.to_row(3).unwrap();
        assert_eq!(row.position, 3);
        assert_eq!(row.year, "1994");
        assert_eq!(row.genres, r#"["Crime","Drama"]"#);

        assert_eq!(Movie::try_from(row).unwrap(), movie);
    }

    #[test]
    fn non_numeric_year_reads_as_zero() {
        let mut row = sample_movie(1, 2000).to_row(0).unwrap();
        row.year = "N/A".to_string();
        assert_eq!(Movie::try_from(row).unwrap().year, 0);
    }

    #[test]
    fn blank_genres_read_as_empty() {
        let mut row = sample_movie(1, 2000).to_row(0).unwrap();
        row.genres = String::new();
        assert!(Movie::try_from(row).unwrap().genres.is_empty());
    }

    #[test]
    fn garbled_genres_are_a_storage_error() {
        let mut row = sample_movie(1, 2000).to_row(0).unwrap();
        row.genres = "[not json".to_string();
        assert!(matches!(Movie::try_from(row), Err(AppError::Storage(DbErr::Json(_)))));
    }

    #[test]
    fn filter_matches_query_case_insensitively() {
        let movie = sample_movie(1, 2000);
        let filter = MovieFilter { query: Some("  jane ".into()), genre: None };
        assert!(filter.matches(&movie));

        let filter = MovieFilter { query: Some("b. actor".into()), genre: None };
        assert!(filter.matches(&movie));

        let filter = MovieFilter { query: Some("zombie".into()), genre: None };
        assert!(!filter.matches(&movie));
    }

    #[test]
    fn filter_matches_genre_exactly() {
        let movie = sample_movie(1, 2000);
        assert!(MovieFilter { query: None, genre: Some("drama".into()) }.matches(&movie));
        assert!(!MovieFilter { query: None, genre: Some("Dram".into()) }.matches(&movie));
        assert!(
            !MovieFilter { query: Some("movie".into()), genre: Some("Comedy".into()) }
                .matches(&movie)
        );
    }

    #[test]
    fn blank_filter_is_empty() {
        let filter = MovieFilter { query: Some("   ".into()), genre: Some(String::new()) };
        assert!(filter.is_empty());
        assert!(filter.matches(&sample_movie(1, 1990)));
    }
}
