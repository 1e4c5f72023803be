use crate::text::{content_words, smart_truncate, split_sentences};
use crate::types::{AdaptedContent, AgeTier, Article, Question, QuestionId, Subject};
use regex::Regex;
use std::collections::HashSet;
use std::sync::OnceLock;
use tracing::debug;

fn number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(\d{1,3}(?:,\d{3})+|\d+(?:\.\d+)?)([a-z]*)(\s*%|\s+[a-z][a-z/-]*)?").expect("static regex")
    })
}

fn simile_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(like an?|as \w+ as)\b").expect("static regex"))
}

const MEASURE_UNITS: &[&str] = &[
    "kg", "kilogram", "kilograms", "gram", "grams", "ton", "tons", "tonnes", "km", "km/h", "kilometer", "kilometers",
    "kilometres", "meter", "meters", "metres", "mile", "miles", "feet", "foot", "inches", "cm", "mm", "degree",
    "degrees", "hour", "hours", "minute", "minutes", "seconds", "days", "years", "light-years", "acres", "liters",
];

#[derive(Debug, Clone, PartialEq)]
enum FactKind {
    Year,
    Percent,
    Measure(String),
    Count,
}

#[derive(Debug, Clone, PartialEq)]
struct NumericFact {
    value: f64,
    kind: FactKind,
}

impl NumericFact {
    fn is_whole(&self) -> bool {
        self.value.fract() == 0.0
    }

    fn unit(&self) -> &str {
        match &self.kind {
            FactKind::Measure(unit) => unit,
            FactKind::Percent => "percent",
            _ => "",
        }
    }
}

/// Numbers in reading order, classified as years, percentages, measurements or plain counts.
fn extract_facts(text: &str) -> Vec<NumericFact> {
    number_re()
        .captures_iter(text)
        .filter_map(|caps| {
            // "3D", "H2O" and similar tokens are not quantities.
            if !caps[2].is_empty() {
                return None;
            }
            let raw = &caps[1];
            let value: f64 = raw.replace(',', "").parse().ok()?;
            let follower = caps.get(3).map(|m| m.as_str().trim().to_lowercase());

            let kind = match follower.as_deref() {
                Some("%") | Some("percent") => FactKind::Percent,
                Some(unit) if MEASURE_UNITS.contains(&unit) => FactKind::Measure(unit.to_string()),
                _ if !raw.contains(',') && value.fract() == 0.0 && (1900.0..=2100.0).contains(&value) => FactKind::Year,
                _ => FactKind::Count,
            };
            Some(NumericFact { value, kind })
        })
        .collect()
}

fn fmt_num(value: f64) -> String {
    if (value - value.round()).abs() < 1e-9 {
        format!("{}", value.round() as i64)
    } else {
        let s = format!("{:.2}", value);
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Unique options, smallest first, so the answer position follows the numbers.
fn numeric_options(answer: f64, distractors: &[f64]) -> Vec<String> {
    let mut values: Vec<f64> = distractors.iter().copied().filter(|d| *d >= 0.0).collect();
    values.push(answer);
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mut seen = HashSet::new();
    values.into_iter().map(fmt_num).filter(|v| seen.insert(v.clone())).collect()
}

struct MathProblem {
    prompt: String,
    answer: f64,
    distractors: Vec<f64>,
    tolerance: f64,
    hint: String,
    explanation: String,
    reasoning: String,
}

fn pick<'a>(facts: &'a [NumericFact], order: &[fn(&NumericFact) -> bool]) -> Option<&'a NumericFact> {
    order.iter().find_map(|wanted| facts.iter().find(|f| wanted(*f)))
}

fn is_year(f: &NumericFact) -> bool {
    f.kind == FactKind::Year
}

fn is_percent(f: &NumericFact) -> bool {
    f.kind == FactKind::Percent && f.value > 0.0 && f.value <= 100.0
}

fn is_quantity(f: &NumericFact) -> bool {
    matches!(f.kind, FactKind::Measure(_) | FactKind::Count) && f.value > 0.0
}

fn is_small_whole(f: &NumericFact) -> bool {
    f.kind != FactKind::Year && f.is_whole() && f.value >= 1.0 && f.value <= 1000.0
}

fn math_from_fact(tier: AgeTier, facts: &[NumericFact]) -> Option<MathProblem> {
    match tier {
        AgeTier::Ages6To8 => {
            let fact = pick(facts, &[is_year, is_small_whole])?;
            let n = fact.value;
            let problem = if fact.kind == FactKind::Year {
                MathProblem {
                    prompt: format!("The story says this happened in {}. What year comes right after {}?", fmt_num(n), fmt_num(n)),
                    answer: n + 1.0,
                    distractors: vec![n - 1.0, n, n + 2.0],
                    tolerance: 0.0,
                    hint: format!("Count up one year from {}.", fmt_num(n)),
                    explanation: format!("{} + 1 = {}", fmt_num(n), fmt_num(n + 1.0)),
                    reasoning: format!(
                        "Years count up by one, just like numbers, so the year after {} is {}.",
                        fmt_num(n),
                        fmt_num(n + 1.0)
                    ),
                }
            } else {
                MathProblem {
                    prompt: format!("The story mentions the number {}. What number comes right after {}?", fmt_num(n), fmt_num(n)),
                    answer: n + 1.0,
                    distractors: vec![n - 1.0, n, n + 2.0],
                    tolerance: 0.0,
                    hint: format!("Count on by one from {}.", fmt_num(n)),
                    explanation: format!("{} + 1 = {}", fmt_num(n), fmt_num(n + 1.0)),
                    reasoning: "Counting on by one always gives the very next number.".to_string(),
                }
            };
            Some(problem)
        }
        AgeTier::Ages9To11 => {
            let fact = pick(facts, &[is_percent, is_quantity, is_year])?;
            let n = fact.value;
            let problem = match fact.kind {
                FactKind::Percent => MathProblem {
                    prompt: format!("The story talks about {}%. What percent is left over from the whole 100%?", fmt_num(n)),
                    answer: 100.0 - n,
                    distractors: vec![n, 100.0 - n + 10.0, (100.0 - n - 10.0).max(0.0)],
                    tolerance: 0.01,
                    hint: "The whole of something is 100%.".to_string(),
                    explanation: format!("100 - {} = {}", fmt_num(n), fmt_num(100.0 - n)),
                    reasoning: "Percent means out of 100, so the part that is left is 100 minus the part named.".to_string(),
                },
                FactKind::Year => {
                    let (answer, prompt) = if n >= 2000.0 {
                        (n - 2000.0, format!("How many years after the year 2000 was {}?", fmt_num(n)))
                    } else {
                        (2000.0 - n, format!("How many years before the year 2000 was {}?", fmt_num(n)))
                    };
                    MathProblem {
                        prompt,
                        answer,
                        distractors: vec![answer + 1.0, (answer - 1.0).max(0.0), answer + 10.0],
                        tolerance: 0.0,
                        hint: "Subtract the smaller year from the larger one.".to_string(),
                        explanation: format!("The difference between {} and 2000 is {}.", fmt_num(n), fmt_num(answer)),
                        reasoning: "The number of years between two dates is found by subtraction.".to_string(),
                    }
                }
                _ => {
                    let unit = fact.unit();
                    MathProblem {
                        prompt: format!("The story mentions {} {}. What is double that amount?", fmt_num(n), unit)
                            .replace("  ", " ")
                            .replace(" .", ".")
                            .replace(" ?", "?"),
                        answer: round2(n * 2.0),
                        distractors: vec![n, round2(n * 2.0 + 2.0), round2(n * 3.0)],
                        tolerance: 0.01,
                        hint: format!("Doubling means adding {} to itself.", fmt_num(n)),
                        explanation: format!("{} × 2 = {}", fmt_num(n), fmt_num(round2(n * 2.0))),
                        reasoning: "Doubling a number is the same as multiplying it by 2.".to_string(),
                    }
                }
            };
            Some(problem)
        }
        AgeTier::Ages12To14 => {
            let fact = pick(facts, &[is_percent, is_quantity, is_year])?;
            let n = fact.value;
            let problem = match fact.kind {
                FactKind::Percent => {
                    let answer = round2(n * 2.0);
                    MathProblem {
                        prompt: format!("If {}% of a group of 200 animals is affected, how many animals is that?", fmt_num(n)),
                        answer,
                        distractors: vec![n, round2(answer + n), round2(200.0 - answer)],
                        tolerance: 0.01,
                        hint: format!("Write {}% as a decimal and multiply by 200.", fmt_num(n)),
                        explanation: format!("200 × {} = {}", fmt_num(n / 100.0), fmt_num(answer)),
                        reasoning: "A percent of a quantity is the quantity times the percent divided by 100.".to_string(),
                    }
                }
                FactKind::Year => {
                    let answer = 2100.0 - n;
                    MathProblem {
                        prompt: format!("How many years are there from {} to the year 2100?", fmt_num(n)),
                        answer,
                        distractors: vec![answer + 1.0, (answer - 10.0).max(0.0), answer + 100.0],
                        tolerance: 0.0,
                        hint: "Subtract the earlier year from 2100.".to_string(),
                        explanation: format!("2100 - {} = {}", fmt_num(n), fmt_num(answer)),
                        reasoning: "Elapsed time between two years is their difference.".to_string(),
                    }
                }
                _ => {
                    let unit = fact.unit();
                    let answer = round2(n * 52.0);
                    let amount = format!("{} {}", fmt_num(n), unit);
                    MathProblem {
                        prompt: format!(
                            "Suppose {} were recorded every week. At that rate, how much would be recorded in a year of 52 weeks?",
                            amount.trim()
                        ),
                        answer,
                        distractors: vec![round2(n * 12.0), round2(n * 365.0), round2(n * 50.0)],
                        tolerance: 0.01,
                        hint: "A year has 52 weeks. Multiply the weekly amount by 52.".to_string(),
                        explanation: format!("{} × 52 = {}", fmt_num(n), fmt_num(answer)),
                        reasoning: "A constant weekly rate scales to a year by multiplying by the number of weeks.".to_string(),
                    }
                }
            };
            Some(problem)
        }
        AgeTier::Ages15To17 => {
            let fact = pick(facts, &[is_quantity, is_percent, is_year])?;
            let n = fact.value;
            let problem = match fact.kind {
                FactKind::Percent => {
                    let answer = round2(n * 1.2 * 0.9);
                    MathProblem {
                        prompt: format!(
                            "A figure of {}% rises by 20% of itself, then the new figure falls by 10% of itself. What is the final percentage?",
                            fmt_num(n)
                        ),
                        answer,
                        distractors: vec![round2(n * 1.1), n, round2(n * 1.2)],
                        tolerance: 0.01,
                        hint: "Apply the changes one after another: multiply by 1.2, then by 0.9.".to_string(),
                        explanation: format!("{} × 1.2 × 0.9 = {}", fmt_num(n), fmt_num(answer)),
                        reasoning: "Successive percentage changes multiply; they do not simply add.".to_string(),
                    }
                }
                FactKind::Year => MathProblem {
                    prompt: format!(
                        "A quantity doubles every 5 years starting in {}. By what factor has it grown by {}?",
                        fmt_num(n),
                        fmt_num(n + 15.0)
                    ),
                    answer: 8.0,
                    distractors: vec![3.0, 6.0, 16.0],
                    tolerance: 0.0,
                    hint: "Count how many 5-year periods fit into 15 years.".to_string(),
                    explanation: "Three doublings: 2 × 2 × 2 = 8".to_string(),
                    reasoning: "Repeated doubling is exponential growth, so the factor is 2 raised to the number of periods.".to_string(),
                },
                _ => {
                    let unit = fact.unit();
                    let answer = round2(n * 1.21);
                    let amount = format!("{} {}", fmt_num(n), unit);
                    MathProblem {
                        prompt: format!(
                            "Starting from {}, the amount grows by 10% each year. What will it be after 2 years?",
                            amount.trim()
                        ),
                        answer,
                        distractors: vec![round2(n * 1.2), round2(n * 1.1), round2(n * 1.3)],
                        tolerance: (answer * 0.005).max(0.01),
                        hint: "Growth compounds: multiply by 1.1 once for each year.".to_string(),
                        explanation: format!("{} × 1.1 × 1.1 = {}", fmt_num(n), fmt_num(answer)),
                        reasoning: "Compound growth applies each year's percentage to the already-grown amount.".to_string(),
                    }
                }
            };
            Some(problem)
        }
    }
}

fn generic_math(tier: AgeTier) -> MathProblem {
    match tier {
        AgeTier::Ages6To8 => MathProblem {
            prompt: "What is 7 + 8?".to_string(),
            answer: 15.0,
            distractors: vec![14.0, 16.0, 17.0],
            tolerance: 0.0,
            hint: "Count up from 7.".to_string(),
            explanation: "7 + 8 = 15".to_string(),
            reasoning: "Addition combines two numbers into one total.".to_string(),
        },
        AgeTier::Ages9To11 => MathProblem {
            prompt: "What is 15% of 200?".to_string(),
            answer: 30.0,
            distractors: vec![25.0, 35.0, 40.0],
            tolerance: 0.01,
            hint: "15% = 15/100 = 0.15".to_string(),
            explanation: "200 × 0.15 = 30".to_string(),
            reasoning: "To find a percentage of a number, multiply by its decimal form.".to_string(),
        },
        AgeTier::Ages12To14 => MathProblem {
            prompt: "A research boat travels 45 km in 3 hours. What is its average speed in km per hour?".to_string(),
            answer: 15.0,
            distractors: vec![12.0, 135.0, 48.0],
            tolerance: 0.01,
            hint: "Speed is distance divided by time.".to_string(),
            explanation: "45 ÷ 3 = 15".to_string(),
            reasoning: "An average rate is the total amount divided by the total time.".to_string(),
        },
        AgeTier::Ages15To17 => MathProblem {
            prompt: "A population of 1000 grows by 10% each year. What is it after 2 years?".to_string(),
            answer: 1210.0,
            distractors: vec![1200.0, 1100.0, 1020.0],
            tolerance: 0.5,
            hint: "Multiply by 1.1 once for each year.".to_string(),
            explanation: "1000 × 1.1 × 1.1 = 1210".to_string(),
            reasoning: "Compound growth applies each year's percentage to the already-grown amount.".to_string(),
        },
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Concept {
    Space,
    Ecosystem,
    Climate,
    ScientificMethod,
}

const SPACE_WORDS: &[&str] = &[
    "planet", "planets", "exoplanet", "moon", "star", "stars", "galaxy", "telescope", "telescopes", "space",
    "astronaut", "astronauts", "rocket", "satellite", "orbit", "orbiting", "lunar", "mars", "spacecraft",
];
const ECOSYSTEM_WORDS: &[&str] = &[
    "ecosystem", "ecosystems", "habitat", "species", "coral", "corals", "reef", "reefs", "forest", "forests",
    "wildlife", "predator", "predators", "biodiversity", "algae", "marine",
];
const CLIMATE_WORDS: &[&str] = &[
    "climate", "carbon", "greenhouse", "warming", "emissions", "temperature", "temperatures", "weather", "rainfall",
];

fn concept_of(article: &Article) -> Concept {
    let words: HashSet<String> = content_words(&format!("{} {}", article.title, article.cleaned_text()))
        .into_iter()
        .collect();
    let present = |list: &[&str]| list.iter().any(|w| words.contains(*w));

    if present(SPACE_WORDS) {
        Concept::Space
    } else if present(ECOSYSTEM_WORDS) {
        Concept::Ecosystem
    } else if present(CLIMATE_WORDS) {
        Concept::Climate
    } else {
        Concept::ScientificMethod
    }
}

struct TextItem {
    prompt: &'static str,
    answer: &'static str,
    distractors: [&'static str; 3],
    hint: &'static str,
    explanation: &'static str,
    reasoning: &'static str,
}

// Reader bands: young (6-8), middle (9-11), older (12-17).
fn science_item(concept: Concept, tier: AgeTier) -> TextItem {
    let band = match tier {
        AgeTier::Ages6To8 => 0,
        AgeTier::Ages9To11 => 1,
        AgeTier::Ages12To14 | AgeTier::Ages15To17 => 2,
    };
    match (concept, band) {
        (Concept::Space, 0) => TextItem {
            prompt: "Which of these is found in space?",
            answer: "The Moon",
            distractors: ["A tree", "A river", "A school bus"],
            hint: "Think about what you can see in the night sky.",
            explanation: "The Moon travels around Earth in space.",
            reasoning: "Space holds the Sun, the Moon, stars and planets; trees and rivers are on Earth.",
        },
        (Concept::Space, 1) => TextItem {
            prompt: "What tool do scientists use to study faraway planets and stars?",
            answer: "A telescope",
            distractors: ["A microscope", "A thermometer", "A magnet"],
            hint: "It makes distant things look closer.",
            explanation: "Telescopes collect light from distant objects so we can study them.",
            reasoning: "Objects in space are very far away, so scientists need tools that gather faint light.",
        },
        (Concept::Space, _) => TextItem {
            prompt: "Why can ice stay frozen for billions of years inside craters near the Moon's poles?",
            answer: "The crater floors never receive direct sunlight",
            distractors: ["The Moon has thick clouds", "The Moon's core is frozen", "Wind keeps the ice cold"],
            hint: "Consider the angle of sunlight near the poles.",
            explanation: "Near the poles, sunlight arrives at a low angle and never reaches deep crater floors.",
            reasoning: "Without sunlight or an atmosphere to carry heat, those regions stay extremely cold.",
        },
        (Concept::Ecosystem, 0) => TextItem {
            prompt: "What do animals need from their home to live?",
            answer: "Food, water and shelter",
            distractors: ["Toys", "Music", "Television"],
            hint: "Think about what you need every day to stay alive.",
            explanation: "Every animal needs food, water and a safe place to live.",
            reasoning: "A habitat gives living things everything they need to survive.",
        },
        (Concept::Ecosystem, 1) => TextItem {
            prompt: "What is an ecosystem?",
            answer: "Living things and their surroundings working together",
            distractors: ["A type of rock", "A machine that cleans water", "A kind of weather"],
            hint: "It includes plants, animals, water and soil.",
            explanation: "An ecosystem is a community of living things interacting with their environment.",
            reasoning: "Plants, animals and their surroundings depend on each other, so a change to one part affects the rest.",
        },
        (Concept::Ecosystem, _) => TextItem {
            prompt: "Why can the loss of one species affect a whole ecosystem?",
            answer: "Species depend on each other through food webs and habitats",
            distractors: ["Every species eats the same food", "Ecosystems only contain one species", "Species never interact"],
            hint: "Think about who eats whom, and who provides shelter.",
            explanation: "Food webs link species, so removing one changes the populations of others.",
            reasoning: "Interdependence means energy and resources flow between species; breaking one link disturbs the flow.",
        },
        (Concept::Climate, 0) => TextItem {
            prompt: "What do trees take in from the air?",
            answer: "Carbon dioxide",
            distractors: ["Sand", "Plastic", "Salt"],
            hint: "It is a gas that people breathe out.",
            explanation: "Trees take in carbon dioxide and give out oxygen.",
            reasoning: "Plants use carbon dioxide, water and sunlight to make their food.",
        },
        (Concept::Climate, 1) => TextItem {
            prompt: "What is the difference between weather and climate?",
            answer: "Weather is day to day; climate is the pattern over many years",
            distractors: ["They mean exactly the same thing", "Climate changes every hour", "Weather only happens in winter"],
            hint: "One is about today, the other about a long time.",
            explanation: "Weather describes short-term conditions while climate describes long-term averages.",
            reasoning: "Scientists study climate by looking at weather data collected over decades.",
        },
        (Concept::Climate, _) => TextItem {
            prompt: "How do greenhouse gases warm the planet?",
            answer: "They trap heat that Earth would otherwise radiate to space",
            distractors: ["They make the Sun hotter", "They block all sunlight", "They cool the oceans"],
            hint: "Think about what a greenhouse does to heat.",
            explanation: "Greenhouse gases absorb outgoing infrared energy and re-emit part of it back toward Earth.",
            reasoning: "More heat retained in the atmosphere raises the average surface temperature.",
        },
        (Concept::ScientificMethod, 0) => TextItem {
            prompt: "What do scientists do to learn about the world?",
            answer: "Do experiments",
            distractors: ["Guess answers", "Make up stories", "Copy others"],
            hint: "Scientists test their ideas.",
            explanation: "Scientists do experiments to test ideas and learn new things.",
            reasoning: "The scientific method uses experiments to discover facts.",
        },
        (Concept::ScientificMethod, 1) => TextItem {
            prompt: "What is the first step in the scientific method?",
            answer: "Ask a question",
            distractors: ["Do an experiment", "Write a conclusion", "Tell others"],
            hint: "Scientists start by wondering about something.",
            explanation: "Scientists begin by asking questions about what they observe.",
            reasoning: "Questions drive scientific investigation and discovery.",
        },
        (Concept::ScientificMethod, _) => TextItem {
            prompt: "Why is peer review important in scientific research?",
            answer: "To check accuracy and validity",
            distractors: ["To make friends", "To copy ideas", "To save time"],
            hint: "Other scientists check the work.",
            explanation: "Peer review ensures research meets scientific standards and is accurate.",
            reasoning: "Scientific knowledge builds on verified, reviewed research.",
        },
    }
}

const GLOSSARY: &[(&str, &str)] = &[
    ("telescope", "A tool that makes faraway things look closer"),
    ("crater", "A bowl-shaped hole in the ground"),
    ("craters", "Bowl-shaped holes in the ground"),
    ("pollution", "Dirty or harmful things in the air, water or land"),
    ("solar", "Using energy from the Sun"),
    ("robot", "A machine that can do jobs by itself"),
    ("climate", "The usual weather of a place over many years"),
    ("ecosystem", "Living things and their surroundings working together"),
    ("orbit", "The path one object takes around another in space"),
    ("species", "A group of living things of the same kind"),
    ("engineers", "People who design and build machines"),
    ("data", "Facts and numbers collected to study something"),
    ("sensors", "Devices that notice things like heat or movement"),
    ("algae", "Tiny plant-like living things in water"),
    ("spacecraft", "A vehicle that travels in space"),
    ("oxygen", "A gas that people and animals need to breathe"),
    ("fuel", "Something burned or used to make power"),
    ("reef", "A ridge of rock or coral near the surface of the sea"),
    ("carbon", "A chemical element found in all living things"),
];

const HOPEFUL_CUES: &[&str] = &[
    "promising", "recovery", "hope", "breakthrough", "exciting", "success", "heal", "improve", "helps", "protect",
];
const CAUTIONARY_CUES: &[&str] = &[
    "warn", "warns", "risk", "threat", "fragile", "danger", "crisis", "decline", "harmful", "pollution", "bleaching",
];

fn sentence_with<'a>(sentences: &'a [String], word: &str) -> Option<&'a String> {
    sentences.iter().find(|s| content_words(s).iter().any(|w| w == word))
}

/// The adapted title, or the opening sentence when the title is blank or a placeholder.
fn main_idea(adapted: &AdaptedContent, sentences: &[String]) -> String {
    let title = adapted.title.trim();
    if !title.is_empty() && !title.eq_ignore_ascii_case("untitled") {
        return title.to_string();
    }
    sentences
        .first()
        .map(|s| smart_truncate(s, 120))
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| "A news story".to_string())
}

fn ela_item(adapted: &AdaptedContent) -> (String, String, Vec<String>, String, String, String) {
    let text = adapted.text();
    let sentences = split_sentences(&text);
    let words: HashSet<String> = content_words(&text).into_iter().collect();

    match adapted.tier {
        AgeTier::Ages6To8 => {
            let first = sentences.first().map(|s| smart_truncate(s, 120)).unwrap_or_default();
            let idea = main_idea(adapted, &sentences);
            (
                "What is this story mostly about?".to_string(),
                idea.clone(),
                vec![
                    "How to bake a cake".to_string(),
                    "The score of a soccer game".to_string(),
                    "How to tie your shoes".to_string(),
                ],
                format!("Read the first sentence again: \"{}\"", first),
                format!("The story is mostly about this: {}.", idea.trim_end_matches('.')),
                "The main idea is what most of the sentences in a story talk about.".to_string(),
            )
        }
        AgeTier::Ages9To11 => {
            let found = GLOSSARY.iter().position(|(word, _)| words.contains(*word));
            match found {
                Some(i) => {
                    let (word, meaning) = GLOSSARY[i];
                    let context = sentence_with(&sentences, word).map(|s| smart_truncate(s, 160)).unwrap_or_default();
                    let distractors = (1..=3)
                        .map(|step| GLOSSARY[(i + step * 5) % GLOSSARY.len()].1.to_string())
                        .collect();
                    (
                        format!("Read this sentence: \"{}\" What does the word \"{}\" mean?", context, word),
                        meaning.to_string(),
                        distractors,
                        "Look at the words around it for clues.".to_string(),
                        format!("In this story, \"{}\" means: {}.", word, meaning.to_lowercase()),
                        "Context clues in the sentence help us work out what a word means.".to_string(),
                    )
                }
                None => (
                    "What is the author's purpose in writing this article?".to_string(),
                    "To inform readers".to_string(),
                    vec!["To entertain".to_string(), "To sell something".to_string(), "To tell jokes".to_string()],
                    "Think about why someone writes news articles.".to_string(),
                    "News articles are written to inform readers about important events and discoveries.".to_string(),
                    "Authors have different purposes: to inform, persuade, or entertain.".to_string(),
                ),
            }
        }
        AgeTier::Ages12To14 => match simile_re().find(&text) {
            Some(m) => {
                let context = sentences
                    .iter()
                    .find(|s| s.contains(m.as_str()))
                    .map(|s| smart_truncate(s, 160))
                    .unwrap_or_default();
                (
                    format!("Which literary device does the writer use in: \"{}\"?", context),
                    "Simile".to_string(),
                    vec!["Metaphor".to_string(), "Alliteration".to_string(), "Onomatopoeia".to_string()],
                    format!("Look at the words \"{}\".", m.as_str()),
                    "The sentence compares two things using \"like\" or \"as\", which makes it a simile.".to_string(),
                    "A simile makes a comparison explicit with \"like\" or \"as\", unlike a metaphor.".to_string(),
                )
            }
            None => (
                "What is the author's main purpose in this article?".to_string(),
                "To inform readers about new findings".to_string(),
                vec![
                    "To persuade readers to buy a product".to_string(),
                    "To entertain readers with a made-up story".to_string(),
                    "To describe the author's personal feelings".to_string(),
                ],
                "Notice whether the article reports facts, tells a story, or sells something.".to_string(),
                "The article reports facts, data and findings, so its purpose is to inform.".to_string(),
                "Informational texts present evidence and explanation rather than opinion or fiction.".to_string(),
            ),
        },
        AgeTier::Ages15To17 => {
            let hopeful: Vec<&str> = HOPEFUL_CUES.iter().copied().filter(|c| words.contains(*c)).collect();
            let cautious: Vec<&str> = CAUTIONARY_CUES.iter().copied().filter(|c| words.contains(*c)).collect();
            let (answer, cue) = if hopeful.len() > cautious.len() {
                ("Optimistic", hopeful.first().copied())
            } else if cautious.len() > hopeful.len() {
                ("Cautionary", cautious.first().copied())
            } else {
                ("Informative", None)
            };
            let distractors = ["Informative", "Optimistic", "Cautionary", "Humorous"]
                .iter()
                .filter(|t| **t != answer)
                .map(|t| t.to_string())
                .collect();
            let hint = match cue {
                Some(cue) => format!("Pay attention to word choices such as \"{}\".", cue),
                None => "Ask whether the writer mostly reports facts or shares feelings.".to_string(),
            };
            (
                "Which word best describes the tone of this article?".to_string(),
                answer.to_string(),
                distractors,
                hint,
                format!("The writer's word choices give the article an {} tone.", answer.to_lowercase())
                    .replace("an cautionary", "a cautionary"),
                "Tone is built from diction: the words an author chooses reveal their attitude toward the subject.".to_string(),
            )
        }
    }
}

/// Builds exactly one Math, one Science and one ELA question for an (article, tier) pair.
/// Deterministic: the same inputs always give the same questions.
#[derive(Debug, Default, Clone)]
pub struct QuestionGenerator;

impl QuestionGenerator {
    pub fn new() -> Self {
        Self
    }

    pub fn generate(&self, article: &Article, adapted: &AdaptedContent) -> [Question; 3] {
        let tier = adapted.tier;
        [
            self.math(article, adapted),
            self.science(article, tier),
            self.ela(article, adapted),
        ]
    }

    fn question(
        article: &Article,
        subject: Subject,
        tier: AgeTier,
        prompt: String,
        answer: String,
        distractors: Vec<String>,
    ) -> Question {
        let mut options: Vec<String> = distractors.into_iter().filter(|d| *d != answer).collect();
        // Answer position rotates with the article so it is not always first.
        let slot = (article.id.0.as_u128() % (options.len() as u128 + 1)) as usize;
        options.insert(slot, answer.clone());

        Question {
            id: QuestionId::derive(article.id, subject, tier),
            article_id: article.id,
            subject,
            tier,
            prompt,
            options,
            answer,
            tolerance: None,
            hint: String::new(),
            explanation: String::new(),
            reasoning: String::new(),
        }
    }

    fn math(&self, article: &Article, adapted: &AdaptedContent) -> Question {
        let tier = adapted.tier;
        // Prefer numbers the reader actually sees in the adapted text.
        let problem = math_from_fact(tier, &extract_facts(&adapted.text()))
            .or_else(|| math_from_fact(tier, &extract_facts(&article.cleaned_text())))
            .unwrap_or_else(|| {
                debug!("No usable numeric fact in {}, using generic {} math", article.id, tier);
                generic_math(tier)
            });

        Question {
            id: QuestionId::derive(article.id, Subject::Math, tier),
            article_id: article.id,
            subject: Subject::Math,
            tier,
            prompt: problem.prompt,
            options: numeric_options(problem.answer, &problem.distractors),
            answer: fmt_num(problem.answer),
            tolerance: Some(problem.tolerance),
            hint: problem.hint,
            explanation: problem.explanation,
            reasoning: problem.reasoning,
        }
    }

    fn science(&self, article: &Article, tier: AgeTier) -> Question {
        let item = science_item(concept_of(article), tier);
        let mut question = Self::question(
            article,
            Subject::Science,
            tier,
            item.prompt.to_string(),
            item.answer.to_string(),
            item.distractors.iter().map(|d| d.to_string()).collect(),
        );
        question.hint = item.hint.to_string();
        question.explanation = item.explanation.to_string();
        question.reasoning = item.reasoning.to_string();
        question
    }

    fn ela(&self, article: &Article, adapted: &AdaptedContent) -> Question {
        let (prompt, answer, distractors, hint, explanation, reasoning) = ela_item(adapted);
        let mut question = Self::question(article, Subject::Ela, adapted.tier, prompt, answer, distractors);
        question.hint = hint;
        question.explanation = explanation;
        question.reasoning = reasoning;
        question
    }
}
