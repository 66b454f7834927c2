use crate::rag::SourceDocument;
use serde_json::{json, Map, Value};

/// Sample clinical guides used to bootstrap an empty knowledge base
pub fn sample_documents() -> Vec<SourceDocument> {
    vec![
        guide(
            "Clinical Guide: Migraine",
            "neurology",
            "neurology",
            "Neurology Handbook",
            &["migraine", "headache", "photophobia", "nausea"],
            MIGRAINE,
        ),
        guide(
            "Protocol: Community-Acquired Pneumonia",
            "pulmonology",
            "internal medicine",
            "Clinical Practice Guidelines",
            &["pneumonia", "cough", "fever", "shortness of breath", "x-ray"],
            PNEUMONIA,
        ),
        guide(
            "Manual: Type 2 Diabetes Mellitus",
            "endocrinology",
            "endocrinology",
            "Diabetes Protocol",
            &["diabetes", "glucose", "thirst", "urination", "fatigue"],
            DIABETES,
        ),
    ]
}

fn guide(
    title: &str,
    document_type: &str,
    specialty: &str,
    source: &str,
    keywords: &[&str],
    text: &str,
) -> SourceDocument {
    let mut metadata = Map::new();
    metadata.insert("specialty".into(), Value::from(specialty));
    metadata.insert("source".into(), Value::from(source));
    metadata.insert("keywords".into(), json!(keywords));

    SourceDocument {
        text: text.to_string(),
        title: Some(title.to_string()),
        document_type: Some(document_type.to_string()),
        metadata,
    }
}

const MIGRAINE: &str = "\
Migraine is a type of headache characterised by recurrent episodes of pulsating, usually \
one-sided head pain, accompanied by nausea, vomiting and sensitivity to light and sound.

Main symptoms: intense pulsating headache; nausea and vomiting; photophobia (sensitivity to \
light); phonophobia (sensitivity to sound); attacks last 4 to 72 hours when untreated.

Treatment: simple analgesics such as paracetamol or ibuprofen; triptans for severe attacks; \
rest in a dark and quiet room; adequate hydration.";

const PNEUMONIA: &str = "\
Pneumonia is a respiratory infection that inflames the air sacs in one or both lungs. It can \
be caused by bacteria, viruses or fungi.

Main symptoms: cough with phlegm that may be green, yellow or bloody; fever, chills and \
sweating; shortness of breath; chest pain when coughing or breathing; fatigue and weakness.

Diagnosis: chest x-ray; blood tests; sputum culture.

Treatment: antibiotics for bacterial pneumonia; antivirals for viral pneumonia; rest and \
hydration; medication for fever and pain.";

const DIABETES: &str = "\
Type 2 diabetes mellitus is a chronic condition that affects the way the body processes blood \
sugar (glucose).

Symptoms: excessive thirst; frequent urination; extreme hunger; unexplained weight loss; \
fatigue; blurred vision; slow-healing wounds.

Management: balanced low-carbohydrate diet; regular exercise; antidiabetic medication; regular \
glucose monitoring; weight control.

Complications: cardiovascular disease; diabetic neuropathy; diabetic retinopathy; diabetic \
nephropathy.";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_documents_are_complete() {
        let docs = sample_documents();
        assert_eq!(docs.len(), 3);
        for doc in &docs {
            assert!(doc.title.is_some());
            assert!(doc.metadata.contains_key("specialty"));
            assert!(doc.text.contains("\n\n"));
        }
    }
}
