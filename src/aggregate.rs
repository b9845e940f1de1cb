// src/aggregate.rs
//! Location aggregation: groups normalized alumni by city or country and
//! applies the course / conclusion-year filters used by the map endpoint.

use crate::database::{
    AlumniCourseLinkRepository, AlumniEicRepository, CityRepository, CountryRepository,
    CourseRepository,
};
use anyhow::Result;
use sqlx::SqlitePool;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Granularity {
    Countries,
    Cities,
}

impl Granularity {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "countries" => Some(Self::Countries),
            "cities" => Some(Self::Cities),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Countries => "countries",
            Self::Cities => "cities",
        }
    }
}

/// Optional course/year filters; an empty string means "no filter".
#[derive(Debug, Clone, Default)]
pub struct LocationFilter {
    pub course: String,
    pub from_year: String,
    pub to_year: String,
}

impl LocationFilter {
    pub fn is_empty(&self) -> bool {
        self.course.is_empty() && self.from_year.is_empty() && self.to_year.is_empty()
    }
}

/// One normalized alumnus with their course links, flattened for grouping.
#[derive(Debug, Clone)]
pub struct AlumnusView {
    pub display_name: String,
    pub linkedin_link: String,
    pub city_id: Option<i64>,
    pub country_id: Option<i64>,
    /// (course abbreviation, year-of-conclusion cell text)
    pub links: Vec<(String, String)>,
}

/// A resolved city or country the aggregates key on.
#[derive(Debug, Clone)]
pub struct Location {
    pub name: String,
    pub geocode: String,
}

/// Aggregation result for one surviving location.
#[derive(Debug, Clone)]
pub struct LocationAggregate {
    pub name: String,
    pub geocode: String,
    pub member_count: usize,
    pub names: Vec<String>,
    pub links_by_member: BTreeMap<String, String>,
    pub courses_by_member: BTreeMap<String, BTreeMap<String, String>>,
}

pub fn is_from_course(alumnus: &AlumnusView, course_filter: &str) -> bool {
    if course_filter.is_empty() {
        return true;
    }
    alumnus
        .links
        .iter()
        .any(|(abbreviation, _)| abbreviation == course_filter)
}

/// Year filter over the alumnus's conclusion years. The year is the second
/// "/"-delimited token of the stored cell ("06/2023" -> 2023). An inverted
/// range (from > to) evaluates false for every alumnus; that behavior is
/// inherited and kept on purpose.
pub fn is_from_conclusion_year(alumnus: &AlumnusView, from_year: &str, to_year: &str) -> bool {
    if from_year.is_empty() {
        return true;
    }

    let Ok(from) = from_year.parse::<i32>() else {
        return false;
    };

    for (_, year_cell) in &alumnus.links {
        let Some(year) = year_cell.split('/').nth(1).and_then(|y| y.parse::<i32>().ok()) else {
            continue;
        };

        if to_year.is_empty() {
            if year >= from {
                return true;
            }
        } else {
            let Ok(to) = to_year.parse::<i32>() else {
                return false;
            };
            if from <= to && from <= year && year <= to {
                return true;
            }
        }
    }

    false
}

/// Partition alumni into buckets keyed by their city or country id; alumni
/// with no reference for the selected granularity are dropped.
pub fn group_alumni(
    granularity: Granularity,
    alumni: &[AlumnusView],
) -> HashMap<i64, Vec<&AlumnusView>> {
    let mut buckets: HashMap<i64, Vec<&AlumnusView>> = HashMap::new();

    for alumnus in alumni {
        let key = match granularity {
            Granularity::Cities => alumnus.city_id,
            Granularity::Countries => alumnus.country_id,
        };
        if let Some(key) = key {
            buckets.entry(key).or_default().push(alumnus);
        }
    }

    buckets
}

/// Aggregate every location bucket whose filtered member maps are both
/// non-empty. Locations without a resolved lookup-table row are skipped.
pub fn build_aggregates(
    granularity: Granularity,
    filter: &LocationFilter,
    alumni: &[AlumnusView],
    locations: &HashMap<i64, Location>,
) -> Vec<LocationAggregate> {
    let buckets = group_alumni(granularity, alumni);
    let mut aggregates = Vec::new();

    let mut keys: Vec<i64> = buckets.keys().copied().collect();
    keys.sort_unstable();

    for key in keys {
        let Some(location) = locations.get(&key) else {
            continue;
        };
        if location.name.is_empty() {
            continue;
        }

        let members: Vec<&&AlumnusView> = buckets[&key]
            .iter()
            .filter(|a| {
                is_from_course(a, &filter.course)
                    && is_from_conclusion_year(a, &filter.from_year, &filter.to_year)
            })
            .collect();

        let mut links_by_member = BTreeMap::new();
        let mut courses_by_member = BTreeMap::new();
        let mut names = Vec::new();

        for member in &members {
            links_by_member.insert(member.linkedin_link.clone(), member.display_name.clone());
            names.push(member.display_name.clone());

            if !member.links.is_empty() {
                let courses: BTreeMap<String, String> = member
                    .links
                    .iter()
                    .map(|(abbreviation, year)| (abbreviation.clone(), year.clone()))
                    .collect();
                courses_by_member.insert(member.linkedin_link.clone(), courses);
            }
        }

        if links_by_member.is_empty() || courses_by_member.is_empty() {
            continue;
        }

        aggregates.push(LocationAggregate {
            name: location.name.clone(),
            geocode: location.geocode.clone(),
            member_count: links_by_member.len(),
            names,
            links_by_member,
            courses_by_member,
        });
    }

    aggregates
}

/// Load the flattened alumni views and the location table for one granularity.
pub async fn load_views(pool: &SqlitePool) -> Result<Vec<AlumnusView>> {
    let alumni = AlumniEicRepository::new(pool).find_all().await?;
    let links = AlumniCourseLinkRepository::new(pool).find_all().await?;
    let courses = CourseRepository::new(pool).find_all().await?;

    let abbreviation_by_id: HashMap<i64, String> = courses
        .into_iter()
        .map(|c| (c.id, c.abbreviation))
        .collect();

    let mut links_by_alumnus: HashMap<i64, Vec<(String, String)>> = HashMap::new();
    for link in links {
        if let Some(abbreviation) = abbreviation_by_id.get(&link.course_id) {
            links_by_alumnus
                .entry(link.alumni_eic_id)
                .or_default()
                .push((abbreviation.clone(), link.year_of_conclusion));
        }
    }

    Ok(alumni
        .into_iter()
        .map(|a| AlumnusView {
            links: links_by_alumnus.remove(&a.id).unwrap_or_default(),
            display_name: a.display_name,
            linkedin_link: a.linkedin_link,
            city_id: a.city_id,
            country_id: a.country_id,
        })
        .collect())
}

pub async fn load_locations(
    pool: &SqlitePool,
    granularity: Granularity,
) -> Result<HashMap<i64, Location>> {
    let locations = match granularity {
        Granularity::Cities => CityRepository::new(pool)
            .find_all()
            .await?
            .into_iter()
            .map(|c| (c.id, Location { name: c.name, geocode: c.geocode }))
            .collect(),
        Granularity::Countries => CountryRepository::new(pool)
            .find_all()
            .await?
            .into_iter()
            .map(|c| (c.id, Location { name: c.name, geocode: c.geocode }))
            .collect(),
    };
    Ok(locations)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alumnus(name: &str, city: Option<i64>, links: &[(&str, &str)]) -> AlumnusView {
        AlumnusView {
            display_name: name.to_string(),
            linkedin_link: format!("https://linkedin.com/in/{}", name.to_lowercase()),
            city_id: city,
            country_id: city,
            links: links
                .iter()
                .map(|(a, y)| (a.to_string(), y.to_string()))
                .collect(),
        }
    }

    #[test]
    fn test_course_filter() {
        let a = alumnus("Ada", Some(1), &[("MIEIC", "06/2019")]);
        assert!(is_from_course(&a, ""));
        assert!(is_from_course(&a, "MIEIC"));
        assert!(!is_from_course(&a, "MEI"));
        assert!(!is_from_course(&a, "mieic"));
    }

    #[test]
    fn test_year_filter_range() {
        let a = alumnus("Ada", Some(1), &[("MIEIC", "06/2023")]);
        assert!(is_from_conclusion_year(&a, "2022", "2024"));
        assert!(is_from_conclusion_year(&a, "2023", "2023"));
        assert!(!is_from_conclusion_year(&a, "2024", "2025"));
    }

    #[test]
    fn test_year_filter_inverted_range_is_false_for_everyone() {
        let inside = alumnus("Ada", Some(1), &[("MIEIC", "06/2023")]);
        assert!(!is_from_conclusion_year(&inside, "2024", "2022"));
    }

    #[test]
    fn test_year_filter_open_ended() {
        let a = alumnus("Ada", Some(1), &[("MEI", "07/2020")]);
        assert!(is_from_conclusion_year(&a, "", ""));
        assert!(is_from_conclusion_year(&a, "2019", ""));
        assert!(!is_from_conclusion_year(&a, "2021", ""));
    }

    #[test]
    fn test_year_filter_unparseable_cell_skipped() {
        let a = alumnus("Ada", Some(1), &[("MEI", "finished in 2020")]);
        assert!(!is_from_conclusion_year(&a, "2019", ""));
    }

    #[test]
    fn test_grouping_drops_null_references() {
        let alumni = vec![
            alumnus("Ada", Some(1), &[("MEI", "06/2020")]),
            alumnus("Bob", Some(1), &[("MEI", "06/2021")]),
            alumnus("Cyd", None, &[("MEI", "06/2022")]),
        ];
        let buckets = group_alumni(Granularity::Cities, &alumni);
        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets[&1].len(), 2);
    }

    #[test]
    fn test_aggregates_skip_locations_without_course_links() {
        let alumni = vec![
            alumnus("Ada", Some(1), &[("MEI", "06/2020")]),
            alumnus("Bob", Some(2), &[]),
        ];
        let mut locations = HashMap::new();
        locations.insert(1, Location { name: "porto".into(), geocode: "[41.1,-8.6]".into() });
        locations.insert(2, Location { name: "braga".into(), geocode: "[41.5,-8.4]".into() });

        let aggregates = build_aggregates(
            Granularity::Cities,
            &LocationFilter::default(),
            &alumni,
            &locations,
        );

        assert_eq!(aggregates.len(), 1);
        assert_eq!(aggregates[0].name, "porto");
        assert_eq!(aggregates[0].member_count, 1);
        assert_eq!(
            aggregates[0].links_by_member["https://linkedin.com/in/ada"],
            "Ada"
        );
        assert_eq!(
            aggregates[0].courses_by_member["https://linkedin.com/in/ada"]["MEI"],
            "06/2020"
        );
    }

    #[test]
    fn test_aggregates_apply_both_filters() {
        let alumni = vec![
            alumnus("Ada", Some(1), &[("MEI", "06/2020")]),
            alumnus("Bob", Some(1), &[("MIEIC", "06/2020")]),
        ];
        let mut locations = HashMap::new();
        locations.insert(1, Location { name: "porto".into(), geocode: "[41.1,-8.6]".into() });

        let filter = LocationFilter {
            course: "MEI".into(),
            from_year: "2020".into(),
            to_year: "2021".into(),
        };
        let aggregates = build_aggregates(Granularity::Cities, &filter, &alumni, &locations);

        assert_eq!(aggregates.len(), 1);
        assert_eq!(aggregates[0].member_count, 1);
        assert!(aggregates[0].links_by_member.contains_key("https://linkedin.com/in/ada"));
    }

    #[tokio::test]
    async fn test_load_views_flattens_links() {
        use crate::database::{
            test_pool, AlumniCourseLinkRepository, AlumniEicRepository, CourseRepository,
        };

        let pool = test_pool().await;
        let course = CourseRepository::new(&pool).save("MEI").await.unwrap();
        let alumnus = AlumniEicRepository::new(&pool)
            .save("Ada", "https://linkedin.com/in/ada", Some(1), Some(1))
            .await
            .unwrap();
        AlumniCourseLinkRepository::new(&pool)
            .upsert(alumnus.id, course.id, "06/2020")
            .await
            .unwrap();

        let views = load_views(&pool).await.unwrap();
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].links, vec![("MEI".to_string(), "06/2020".to_string())]);
    }
}
