use super::types::{QueryType, RetrievalParams};

/// Classify a patient query into a type using keyword heuristics.
pub fn classify_query(text: &str) -> QueryType {
    let lower = text.to_lowercase();

    if has_timeline_pattern(&lower) {
        return QueryType::Timeline;
    }

    if has_symptom_pattern(&lower) {
        return QueryType::Symptom;
    }

    if has_exploratory_pattern(&lower) {
        return QueryType::Exploratory;
    }

    if has_factual_pattern(&lower) {
        return QueryType::Factual;
    }

    QueryType::General
}

/// Determine retrieval parameters based on query type.
pub fn retrieval_strategy(query_type: &QueryType) -> RetrievalParams {
    match query_type {
        QueryType::Factual => RetrievalParams {
            semantic_top_k: 5,
            include_medications: true,
            include_labs: true,
            include_diagnoses: true,
            include_allergies: true,
            include_symptoms: false,
            include_conversations: false,
            temporal_weight: 0.2,
        },
        QueryType::Exploratory => RetrievalParams {
            semantic_top_k: 8,
            include_medications: true,
            include_labs: true,
            include_diagnoses: true,
            include_allergies: true,
            include_symptoms: true,
            include_conversations: true,
            temporal_weight: 0.5,
        },
        QueryType::Symptom => RetrievalParams {
            semantic_top_k: 5,
            include_medications: true,
            include_labs: false,
            include_diagnoses: true,
            include_allergies: false,
            include_symptoms: true,
            include_conversations: false,
            temporal_weight: 0.7,
        },
        QueryType::Timeline => RetrievalParams {
            semantic_top_k: 3,
            include_medications: true,
            include_labs: true,
            include_diagnoses: true,
            include_allergies: false,
            include_symptoms: true,
            include_conversations: false,
            temporal_weight: 1.0,
        },
        QueryType::General => RetrievalParams {
            semantic_top_k: 5,
            include_medications: true,
            include_labs: false,
            include_diagnoses: true,
            include_allergies: false,
            include_symptoms: false,
            include_conversations: false,
            temporal_weight: 0.3,
        },
    }
}

fn has_timeline_pattern(text: &str) -> bool {
    let patterns = [
        // English
        "what changed",
        "what's changed",
        "since my last",
        "since last visit",
        "over the past",
        "history of",
        "when did",
        "how long",
        "timeline",
        "chronolog",
        "what happened",
        "evolution",
        "progression",
        // French (M.5)
        "qu'est-ce qui a chang",
        "depuis ma derni",
        "depuis la derni",
        "au cours des",
        "historique",
        "quand est-ce",
        "depuis combien",
        "chronologie",
        "que s'est-il pass",
    ];
    patterns.iter().any(|p| text.contains(p))
}

fn has_symptom_pattern(text: &str) -> bool {
    let patterns = [
        // English
        "feeling",
        "symptom",
        "pain",
        "dizzy",
        "nausea",
        "headache",
        "tired",
        "fatigue",
        "side effect",
        "since i started",
        "after taking",
        "hurts",
        "uncomfortable",
        "worse",
        "better",
        // French (M.5)
        "je me sens",
        "je ressens",
        "symptome",
        "symptôme",
        "douleur",
        "vertige",
        "nausee",
        "nausée",
        "mal de tete",
        "mal de tête",
        "fatigue",
        "effet secondaire",
        "effet indesirable",
        "effet indésirable",
        "depuis que je prends",
        "j'ai mal",
        "inconfortable",
        "empire",
        "ameliore",
        "amélioré",
    ];
    patterns.iter().any(|p| text.contains(p))
}

fn has_exploratory_pattern(text: &str) -> bool {
    let patterns = [
        // English
        "what should i ask",
        "what questions",
        "prepare for",
        "before my appointment",
        "what to expect",
        "should i be concerned",
        "what does this mean",
        "help me understand",
        // French (M.5)
        "que devrais-je demander",
        "quelles questions",
        "preparer pour",
        "préparer pour",
        "avant mon rendez-vous",
        "avant ma consultation",
        "a quoi m'attendre",
        "à quoi m'attendre",
        "dois-je m'inquieter",
        "dois-je m'inquiéter",
        "qu'est-ce que cela signifie",
        "qu'est-ce que ça veut dire",
        "aidez-moi a comprendre",
        "aidez-moi à comprendre",
    ];
    patterns.iter().any(|p| text.contains(p))
}

fn has_factual_pattern(text: &str) -> bool {
    let patterns = [
        // English
        "what is my",
        "what's my",
        "what dose",
        "how much",
        "how often",
        "who prescribed",
        "when was",
        "which doctor",
        "what medication",
        "what are my",
        "lab result",
        "test result",
        // French (M.5)
        "quel est mon",
        "quelle est ma",
        "quels sont mes",
        "quelles sont mes",
        "quelle dose",
        "combien de",
        "a quelle frequence",
        "à quelle fréquence",
        "qui a prescrit",
        "quel medecin",
        "quel médecin",
        "quel medicament",
        "quel médicament",
        "resultat de laboratoire",
        "résultat de laboratoire",
        "resultat d'analyse",
        "résultat d'analyse",
        "bilan sanguin",
    ];
    patterns.iter().any(|p| text.contains(p))
}

/// Extract medical keywords from a query for targeted SQLite lookups.
pub fn extract_medical_keywords(query: &str) -> Vec<String> {
    let words: Vec<&str> = query.split_whitespace().collect();
    let mut keywords = Vec::new();

    for word in &words {
        let clean = word.trim_matches(|c: char| !c.is_alphanumeric());
        if clean.len() >= 3 {
            keywords.push(clean.to_lowercase());
        }
    }

    keywords
}
