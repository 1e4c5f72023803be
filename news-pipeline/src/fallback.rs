use crate::types::{Article, ArticleId, Category};
use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

struct FallbackStory {
    category: Category,
    title: &'static str,
    url: &'static str,
    published: (i32, u32, u32),
    body: &'static str,
}

const STORIES: &[FallbackStory] = &[
    FallbackStory {
        category: Category::Science,
        title: "Scientists Discover New Planet",
        url: "https://example.com/planet",
        published: (2024, 1, 15),
        body: "Astronomers have made an exciting discovery in deep space - a new planet outside our solar system called an exoplanet. This distant world, located about 100 light-years from Earth, has captured scientists' attention because it might have conditions suitable for liquid water.\n\n\
Using powerful space telescopes like the James Webb Space Telescope, researchers detected this planet by observing tiny changes in starlight as the planet passed in front of its host star. This method, called the transit technique, allows scientists to learn about the planet's size, atmosphere, and potential for supporting life.\n\n\
The discovery is particularly significant because the planet orbits within its star's habitable zone - the region where temperatures are just right for liquid water to exist. While we can't visit this planet with current technology, studying it helps us understand how planetary systems form and whether life might exist elsewhere in the universe.",
    },
    FallbackStory {
        category: Category::Science,
        title: "Water Ice Found at the Moon's South Pole",
        url: "https://example.com/moon-ice",
        published: (2024, 3, 4),
        body: "Scientists found water ice at the Moon's south pole in 2024. The ice hides inside deep craters that never see sunlight, where temperatures stay colder than anywhere else in the solar system.\n\n\
Researchers used an orbiting spacecraft to measure how sunlight and radar bounce off the crater floors, and the measurements confirmed that frozen water is mixed into the soil. Future astronauts could melt the ice for drinking water, and they could split it into oxygen and hydrogen to make rocket fuel.\n\n\
Space agencies are now planning missions that will land near the pole and drill into the ice to learn how much is there.",
    },
    FallbackStory {
        category: Category::Technology,
        title: "New Robot Helps Clean Ocean",
        url: "https://example.com/robot",
        published: (2024, 2, 10),
        body: "Marine engineers have developed an innovative autonomous robot designed to tackle one of our planet's biggest environmental challenges: ocean pollution. This solar-powered device, roughly the size of a small boat, uses advanced sensors and artificial intelligence to identify and collect plastic waste floating on the ocean's surface.\n\n\
The robot operates by scanning the water with cameras and using machine learning algorithms to distinguish between marine life and debris. Once plastic is detected, mechanical arms extend to carefully collect the waste without harming sea creatures. The collected plastic is stored in onboard compartments that can hold up to 500 kilograms of debris.\n\n\
Early trials in the Pacific Ocean have shown promising results, with the robot collecting over 2,000 pieces of plastic waste in just one month. The technology represents a significant step forward in ocean conservation efforts.",
    },
    FallbackStory {
        category: Category::Technology,
        title: "Students Build a Solar-Powered Weather Station",
        url: "https://example.com/weather-station",
        published: (2024, 4, 22),
        body: "A team of 12 high school students built a solar-powered weather station that sends readings to their classroom every 10 minutes. The station measures temperature, wind speed, and rainfall, and it stores the data online so anyone can study it.\n\n\
The students programmed a small computer to check the sensors and used a solar panel to keep the battery charged. During a storm last month, the station recorded wind gusts of 65 kilometers per hour, and the students compared their data with the national weather service.\n\n\
Their science coach says the project shows how engineering and science work together to solve real problems.",
    },
    FallbackStory {
        category: Category::Environment,
        title: "Trees Help Fight Climate Change",
        url: "https://example.com/trees",
        published: (2024, 1, 28),
        body: "Climate scientists have published new research highlighting the crucial role that forests play in combating global warming. Trees act as natural carbon capture systems, absorbing carbon dioxide from the atmosphere during photosynthesis and storing it in their wood, roots, and surrounding soil.\n\n\
The study, conducted across multiple continents, found that mature forests can absorb up to 2.6 tons of carbon dioxide per acre annually. This process not only removes greenhouse gases from the atmosphere but also produces oxygen as a byproduct.\n\n\
Researchers emphasize that protecting existing forests and planting new trees are among the most cost-effective strategies for addressing climate change. The findings support global reforestation initiatives and highlight the importance of sustainable forestry practices.",
    },
    FallbackStory {
        category: Category::Environment,
        title: "Coral Reefs Show Signs of Recovery",
        url: "https://example.com/coral",
        published: (2024, 5, 6),
        body: "Marine biologists report that coral cover on parts of a large reef grew by 30 percent over three years. Corals are tiny animals that build rocky homes, and the reef they create shelters thousands of fish species.\n\n\
Warm ocean water can cause bleaching, when corals lose the algae that feed them, but cooler summers gave many reefs time to heal. Scientists warn that the recovery is fragile because rising temperatures could bring bleaching back.\n\n\
Protecting water quality and limiting fishing pressure help the whole ecosystem stay healthy.",
    },
];

/// Static articles that stand in for live content when a source or an entry fails.
/// Selection rotates round-robin through each category's stories.
pub struct FallbackLibrary {
    cursors: Mutex<HashMap<Category, usize>>,
}

impl FallbackLibrary {
    pub fn new() -> Self {
        Self {
            cursors: Mutex::new(HashMap::new()),
        }
    }

    pub fn all(&self, category: Category) -> Vec<Article> {
        STORIES
            .iter()
            .filter(|s| s.category == category)
            .map(to_article)
            .collect()
    }

    /// Next fallback article for the category.
    pub fn next(&self, category: Category) -> Article {
        let stories: Vec<&FallbackStory> = STORIES.iter().filter(|s| s.category == category).collect();
        let mut cursors = self.cursors.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let cursor = cursors.entry(category).or_insert(0);
        let story = stories[*cursor % stories.len()];
        *cursor = (*cursor + 1) % stories.len();
        debug!("Using fallback article '{}' for {}", story.title, category);
        to_article(story)
    }
}

impl Default for FallbackLibrary {
    fn default() -> Self {
        Self::new()
    }
}

fn to_article(story: &FallbackStory) -> Article {
    let (y, m, d) = story.published;
    let published_at: DateTime<Utc> = Utc
        .with_ymd_and_hms(y, m, d, 12, 0, 0)
        .single()
        .unwrap_or_default();
    let cleaned: Vec<String> = story.body.split("\n\n").map(|p| p.trim().to_string()).collect();

    Article {
        id: ArticleId::derive(story.url, &published_at),
        category: story.category,
        source_name: "Knowledge R Us".to_string(),
        title: story.title.to_string(),
        url: story.url.to_string(),
        raw_text: story.body.to_string(),
        cleaned,
        published_at,
        is_fallback: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_category_has_several_stories() {
        let library = FallbackLibrary::new();
        for category in Category::ALL {
            let stories = library.all(category);
            assert!(stories.len() >= 2, "{} has {} stories", category, stories.len());
            assert!(stories.iter().all(|a| a.category == category && a.is_fallback));
            assert!(stories.iter().all(|a| !a.cleaned.is_empty()));
        }
    }

    #[test]
    fn selection_is_round_robin_per_category() {
        let library = FallbackLibrary::new();
        let first = library.next(Category::Science);
        let second = library.next(Category::Science);
        let third = library.next(Category::Science);
        assert_ne!(first.id, second.id);
        assert_eq!(first.id, third.id);

        // Another category keeps its own cursor.
        let tech = library.next(Category::Technology);
        assert_eq!(tech.id, library.all(Category::Technology)[0].id);
    }

    #[test]
    fn fallback_ids_are_stable() {
        let a = FallbackLibrary::new().next(Category::Environment);
        let b = FallbackLibrary::new().next(Category::Environment);
        assert_eq!(a.id, b.id);
    }
}
